// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all state shared between
//! the accept loop and the connection tasks.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::BrokerError;
use crate::core::auth::{AuthGate, SaslCredential};
use crate::core::registry::{ConnectionId, ConnectionIdGenerator, ConnectionRegistry};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// The shared server context. It is wrapped in an `Arc` and handed to every
/// connection, serving as the connection's way back into the server for
/// authentication and deregistration.
#[derive(Debug)]
pub struct ServerState {
    /// The configuration the server was started with. Never changes afterwards.
    pub config: Arc<Config>,
    /// The authentication gate, built from the configured users before the
    /// first connection is accepted.
    pub auth: Arc<AuthGate>,
    /// All live connections, keyed by connection id.
    pub registry: ConnectionRegistry,
    /// The process-wide connection id sequence.
    pub ids: ConnectionIdGenerator,
    /// Broadcasts the server-wide shutdown signal to connection handlers.
    pub shutdown_tx: broadcast::Sender<()>,
    pub stats: StatsState,
}

impl ServerState {
    /// Builds the credential store and an empty registry. A malformed password
    /// hash in the configuration fails here, before anything is bound.
    pub fn initialize(config: Config) -> Result<Arc<Self>, BrokerError> {
        let auth = AuthGate::from_config(&config)?;
        Ok(Self::with_auth(config, auth))
    }

    /// Builds the state around an already constructed gate.
    pub fn with_auth(config: Config, auth: AuthGate) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            registry: ConnectionRegistry::new(),
            ids: ConnectionIdGenerator::default(),
            shutdown_tx,
            stats: StatsState::new(),
        })
    }

    pub fn protocol_version(&self) -> &str {
        &self.config.protocol_version
    }

    /// Called once by every connection when it finishes. Removes the
    /// connection from the registry; calling it again is harmless.
    pub fn register_termination(&self, id: ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(record) => {
                debug!(
                    "Connection {} from {} unregistered after {:?}.",
                    id,
                    record.remote_addr,
                    record.created.elapsed()
                );
                true
            }
            None => false,
        }
    }

    /// Checks a credential on behalf of a connection handler.
    pub async fn authenticate(&self, credential: SaslCredential) -> bool {
        self.auth.authenticate_async(credential).await
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
