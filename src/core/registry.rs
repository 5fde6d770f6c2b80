// src/core/registry.rs

//! The registry of live connections, shared between the accept loop and every
//! connection task.

use crate::core::errors::BrokerError;
use crate::core::metrics;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;

/// Identifies an accepted connection for the lifetime of the process.
/// Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Returns `None` for zero, which is never a valid id.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(ConnectionId(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing connection ids starting at 1.
///
/// Lives in the shared server state so every acceptor bound to that state
/// draws from the same sequence and an id is never issued twice.
#[derive(Debug)]
pub struct ConnectionIdGenerator {
    next: AtomicU64,
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl ConnectionIdGenerator {
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// What the registry knows about one live connection.
#[derive(Debug)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    /// Transport name, e.g. `tcp`.
    pub network: &'static str,
    pub created: Instant,
    close_tx: broadcast::Sender<()>,
}

impl ConnectionRecord {
    /// Creates a record along with the receiver its connection handler listens
    /// on for close requests.
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        network: &'static str,
    ) -> (Self, broadcast::Receiver<()>) {
        let (close_tx, close_rx) = broadcast::channel(1);
        let record = Self {
            id,
            remote_addr,
            network,
            created: Instant::now(),
            close_tx,
        };
        (record, close_rx)
    }

    /// Asks the connection's handler to stop. Returns false if the handler is
    /// no longer listening.
    pub fn request_close(&self) -> bool {
        self.close_tx.send(()).is_ok()
    }
}

/// A concurrent map from connection id to its record.
///
/// `add` is called from the single accept loop while `remove` and `get` may be
/// called from any number of connection tasks at once.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionRecord>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. An id that is already present is rejected and
    /// the existing record is left untouched.
    pub fn add(
        &self,
        id: ConnectionId,
        record: ConnectionRecord,
    ) -> Result<Arc<ConnectionRecord>, BrokerError> {
        debug_assert_eq!(id, record.id);
        match self.connections.entry(id) {
            Entry::Occupied(_) => Err(BrokerError::DuplicateConnection(id)),
            Entry::Vacant(slot) => {
                let record = Arc::new(record);
                slot.insert(record.clone());
                metrics::CONNECTED_CLIENTS.inc();
                Ok(record)
            }
        }
    }

    /// Removes a connection. Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionRecord>> {
        let removed = self.connections.remove(&id).map(|(_, record)| record);
        if removed.is_some() {
            metrics::CONNECTED_CLIENTS.dec();
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionRecord>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// A sorted snapshot of the registered ids.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Signals a single connection's handler to stop. Returns false if the id
    /// is not registered.
    pub fn close(&self, id: ConnectionId) -> bool {
        match self.get(id) {
            Some(record) => {
                record.request_close();
                true
            }
            None => false,
        }
    }

    /// Removes every record and returns how many were removed.
    pub fn drain(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.into_iter()
            .filter(|id| self.remove(*id).is_some())
            .count()
    }
}
