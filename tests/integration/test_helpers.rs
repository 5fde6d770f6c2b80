// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use async_trait::async_trait;
use brokerd::config::Config;
use brokerd::connection::ConnectionHandler;
use brokerd::core::ServerState;
use brokerd::core::auth::UserEntry;
use brokerd::server::{Acceptor, Listener, StopHandle};
use rand::rngs::OsRng;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Hashes a password with deliberately low Argon2 costs so tests stay fast.
pub fn cheap_hash(password: &str) -> String {
    let params = Params::new(1024, 1, 1, None).expect("valid argon2 params");
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .expect("hashing should succeed")
        .to_string()
}

/// Sets up minimal tracing for tests (ignores the error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A config with the given users, no auth failure delay and a short grace period.
pub fn test_config(users: &[(&str, &str)]) -> Config {
    let mut config = Config::default();
    config.port = 0;
    config.users = users
        .iter()
        .map(|(name, password)| UserEntry::new(*name, cheap_hash(password)))
        .collect();
    config.auth.failure_delay = Duration::ZERO;
    config.shutdown_grace = Duration::from_millis(500);
    config.accept_backoff = Duration::from_millis(5);
    config
}

pub fn test_state(users: &[(&str, &str)]) -> Arc<ServerState> {
    init_tracing();
    ServerState::initialize(test_config(users)).expect("Failed to initialize server state")
}

type ScriptedAccept = io::Result<(DuplexStream, SocketAddr)>;

/// An in-memory listener whose accept results are fed by the test.
pub struct ScriptedListener {
    rx: mpsc::UnboundedReceiver<ScriptedAccept>,
}

#[async_trait]
impl Listener for ScriptedListener {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
        match self.rx.recv().await {
            Some(result) => result,
            // Script exhausted: behave like an idle listener.
            None => std::future::pending().await,
        }
    }

    fn network(&self) -> &'static str {
        "memory"
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

/// The test's side of a `ScriptedListener`.
pub struct ScriptedClient {
    tx: mpsc::UnboundedSender<ScriptedAccept>,
    next_port: u16,
}

impl ScriptedClient {
    /// Queues an inbound connection and returns the client's end of it.
    pub fn connect(&mut self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(1024);
        self.next_port += 1;
        let addr = SocketAddr::from(([10, 0, 0, 1], self.next_port));
        self.tx
            .send(Ok((server, addr)))
            .expect("listener dropped");
        client
    }

    /// Queues a failed accept.
    pub fn fail(&self, err: io::Error) {
        self.tx.send(Err(err)).expect("listener dropped");
    }
}

pub fn scripted_listener() -> (ScriptedListener, ScriptedClient) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ScriptedListener { rx },
        ScriptedClient {
            tx,
            next_port: 40000,
        },
    )
}

/// A running acceptor over a scripted listener.
pub struct TestServer {
    pub state: Arc<ServerState>,
    pub client: ScriptedClient,
    pub stop: StopHandle,
    pub task: JoinHandle<Result<(), brokerd::core::BrokerError>>,
}

impl TestServer {
    pub fn spawn(
        state: Arc<ServerState>,
        handler: Arc<dyn ConnectionHandler<DuplexStream>>,
    ) -> Self {
        let (listener, client) = scripted_listener();
        let acceptor = Acceptor::with_listener(state.clone(), listener, handler);
        let stop = acceptor.stop_handle();
        let task = tokio::spawn(acceptor.run());
        Self {
            state,
            client,
            stop,
            task,
        }
    }

    /// Stops the acceptor and returns the result of its loop.
    pub async fn shutdown(self) -> Result<(), brokerd::core::BrokerError> {
        self.stop.stop();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("acceptor did not stop in time")
            .expect("acceptor task panicked")
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
