// src/server/mod.rs

use crate::config::Config;
use crate::connection::HoldHandler;
use crate::core::ServerState;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{info, warn};

mod accept_policy;
mod acceptor;
mod listener;
mod metrics_server;

pub use accept_policy::{AcceptAction, AcceptErrorPolicy, DefaultAcceptPolicy};
pub use acceptor::{Acceptor, AcceptorPhase, StopHandle};
pub use listener::Listener;

/// The main server startup function: builds the shared state, binds the
/// listener, and accepts connections until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    log_startup_info(&config);

    let state = ServerState::initialize(config)?;
    info!("Server state initialized.");

    let mut background_tasks = JoinSet::new();
    if state.config.metrics.enabled {
        let port = state.config.metrics.port;
        let shutdown_rx = state.subscribe_shutdown();
        background_tasks.spawn(metrics_server::run_metrics_server(port, shutdown_rx));
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    let mut acceptor = Acceptor::new(state.clone(), Arc::new(HoldHandler));
    acceptor.start().await?;

    let stop = acceptor.stop_handle();
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
        stop.stop();
    });

    let result = acceptor.run().await;

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    }
    info!("Server shutdown complete.");

    result.map_err(Into::into)
}

fn log_startup_info(config: &Config) {
    info!(
        "brokerd {} starting (protocol {}).",
        env!("CARGO_PKG_VERSION"),
        config.protocol_version
    );
    if config.users.is_empty() {
        warn!("No users are configured; every authentication attempt will be rejected.");
    }
}
