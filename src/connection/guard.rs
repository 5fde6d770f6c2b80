// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard that deregisters a connection.

use crate::core::registry::ConnectionId;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Guarantees that a connection is removed from the registry exactly once,
/// whichever way its handler exits.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    id: ConnectionId,
    addr: SocketAddr,
    released: bool,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            state,
            id,
            addr,
            released: false,
        }
    }

    /// Reports termination now instead of waiting for the guard to drop.
    /// Returns false if termination was already reported.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        debug!(
            "Releasing connection {} from {}.",
            self.id, self.addr
        );
        self.state.register_termination(self.id);
        true
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
