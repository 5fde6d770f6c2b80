// src/core/mod.rs

//! The central module containing the credential store, the authentication gate,
//! the connection registry and the shared server state.

pub mod auth;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod state;

pub use errors::BrokerError;
pub use registry::{ConnectionId, ConnectionRecord, ConnectionRegistry};
pub use state::ServerState;
