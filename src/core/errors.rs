// src/core/errors.rs

//! Defines the primary error type for the broker front door.

use crate::core::registry::ConnectionId;
use thiserror::Error;

/// The main error enum, representing all failures the acceptor, the registry
/// and the authentication gate can report.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The listening endpoint could not be bound. Fatal at startup.
    #[error("failed to bind listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener failed in a way the accept policy considers unrecoverable.
    #[error("listener failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid password hash for user '{username}': {reason}")]
    InvalidPasswordHash { username: String, reason: String },

    #[error("invalid user entry: {0}")]
    InvalidUser(String),

    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    #[error("operation not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// A connection handler gave up on its connection.
    #[error("connection handler error: {0}")]
    Handler(String),
}
