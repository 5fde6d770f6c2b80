// tests/integration/tcp_test.rs

//! The acceptor bound to a real TCP socket.

use super::test_helpers::{init_tracing, test_config, wait_until};
use brokerd::connection::HoldHandler;
use brokerd::core::{BrokerError, ServerState};
use brokerd::server::{Acceptor, AcceptorPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn test_start_binds_and_accepts_tcp_connections() {
    init_tracing();
    let state = ServerState::initialize(test_config(&[])).unwrap();
    let mut acceptor = Acceptor::new(state.clone(), Arc::new(HoldHandler));
    assert_eq!(acceptor.phase(), AcceptorPhase::Created);
    assert!(acceptor.local_addr().is_none());

    let addr = acceptor.start().await.unwrap();
    assert_eq!(acceptor.phase(), AcceptorPhase::Listening);
    assert_ne!(addr.port(), 0);
    assert_eq!(acceptor.local_addr(), Some(addr));

    let stop = acceptor.stop_handle();
    let task = tokio::spawn(acceptor.run());

    let client = TcpStream::connect(addr).await.unwrap();
    let local = client.local_addr().unwrap();
    assert!(wait_until(|| state.registry.count() == 1).await);

    let id = state.registry.ids()[0];
    let record = state.registry.get(id).unwrap();
    assert_eq!(id.get(), 1);
    assert_eq!(record.network, "tcp");
    assert_eq!(record.remote_addr, local);

    drop(client);
    assert!(wait_until(|| state.registry.is_empty()).await);

    stop.stop();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // The endpoint is closed once the acceptor has stopped.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_bind_failure_reports_address() {
    init_tracing();
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut config = test_config(&[]);
    config.port = port;
    let state = ServerState::initialize(config).unwrap();
    let mut acceptor = Acceptor::new(state, Arc::new(HoldHandler));

    let err = acceptor.start().await.unwrap_err();
    match err {
        BrokerError::Bind { address, .. } => assert_eq!(address, format!("127.0.0.1:{port}")),
        other => panic!("expected a bind error, got {other:?}"),
    }
    assert_eq!(acceptor.phase(), AcceptorPhase::Created);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    init_tracing();
    let state = ServerState::initialize(test_config(&[])).unwrap();
    let mut acceptor = Acceptor::new(state, Arc::new(HoldHandler));
    acceptor.start().await.unwrap();

    let err = acceptor.start().await.unwrap_err();
    assert!(matches!(err, BrokerError::InvalidState(_)));
}

#[tokio::test]
async fn test_run_without_start_is_rejected() {
    init_tracing();
    let state = ServerState::initialize(test_config(&[])).unwrap();
    let acceptor = Acceptor::new(state, Arc::new(HoldHandler));

    let err = acceptor.run().await.unwrap_err();
    assert!(matches!(err, BrokerError::InvalidState(_)));
}

#[tokio::test]
async fn test_serve_binds_runs_and_stops() {
    init_tracing();
    let state = ServerState::initialize(test_config(&[])).unwrap();
    let acceptor = Acceptor::new(state.clone(), Arc::new(HoldHandler));
    let stop = acceptor.stop_handle();
    let task = tokio::spawn(acceptor.serve());

    assert!(wait_until(|| stop.phase() == AcceptorPhase::Accepting).await);
    stop.stop();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(stop.phase(), AcceptorPhase::Stopped);
    assert!(state.registry.is_empty());
}
