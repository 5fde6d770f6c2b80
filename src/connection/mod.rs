// src/connection/mod.rs

//! The per-connection side of the server: the context handed to each accepted
//! connection, the guard that deregisters it, and the handler seam.

mod context;
mod guard;
mod handler;

pub use context::{ConnectionContext, ShutdownSignal};
pub use guard::ConnectionGuard;
pub use handler::{ConnectionHandler, HoldHandler};
