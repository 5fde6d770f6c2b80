// src/core/auth/mod.rs

//! Credential storage and the authentication gate.

mod credentials;
mod gate;
mod user;

pub use credentials::CredentialStore;
pub use gate::{AuthGate, hash_password};
pub use user::{SaslCredential, UserEntry};
