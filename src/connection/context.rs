// src/connection/context.rs

//! The per-connection context handed to a connection handler.

use super::guard::ConnectionGuard;
use crate::core::auth::SaslCredential;
use crate::core::registry::ConnectionId;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Resolves when the server shuts down or this single connection is asked to
/// close.
pub struct ShutdownSignal {
    global_rx: broadcast::Receiver<()>,
    close_rx: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    pub(crate) fn new(global_rx: broadcast::Receiver<()>, close_rx: broadcast::Receiver<()>) -> Self {
        Self {
            global_rx,
            close_rx,
        }
    }

    /// Waits for either signal. A dropped sender counts as a signal: the
    /// record holding it has left the registry.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.global_rx.recv() => {}
            _ = self.close_rx.recv() => {}
        }
    }
}

/// Everything a connection handler gets for one accepted connection: the
/// stream, its identity, and a way back into the server.
///
/// Dropping the context reports the connection's termination.
pub struct ConnectionContext<S> {
    stream: S,
    id: ConnectionId,
    remote_addr: SocketAddr,
    network: &'static str,
    state: Arc<ServerState>,
    signal: ShutdownSignal,
    guard: ConnectionGuard,
}

impl<S> ConnectionContext<S> {
    pub fn new(
        stream: S,
        id: ConnectionId,
        remote_addr: SocketAddr,
        network: &'static str,
        state: Arc<ServerState>,
        close_rx: broadcast::Receiver<()>,
    ) -> Self {
        let signal = ShutdownSignal::new(state.subscribe_shutdown(), close_rx);
        let guard = ConnectionGuard::new(state.clone(), id, remote_addr);
        Self {
            stream,
            id,
            remote_addr,
            network,
            state,
            signal,
            guard,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn network(&self) -> &'static str {
        self.network
    }

    /// The protocol version the server was configured with.
    pub fn protocol_version(&self) -> &str {
        self.state.protocol_version()
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Borrows the stream and the shutdown signal together so both can be
    /// polled in one `select!`.
    pub fn io(&mut self) -> (&mut S, &mut ShutdownSignal) {
        (&mut self.stream, &mut self.signal)
    }

    /// Checks a credential presented during the handshake.
    ///
    /// The returned future owns its handle on the server state, so it is
    /// `Send` whether or not the stream is `Sync`.
    pub fn authenticate(
        &self,
        credential: SaslCredential,
    ) -> impl Future<Output = bool> + Send + use<S> {
        let state = Arc::clone(&self.state);
        async move { state.authenticate(credential).await }
    }

    /// Reports termination early. Later calls, and the eventual drop, do
    /// nothing.
    pub fn register_termination(&mut self) -> bool {
        self.guard.release()
    }
}
