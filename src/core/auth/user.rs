// src/core/auth/user.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a single configured user.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// The username, matched case-sensitively.
    pub username: String,
    /// An Argon2 PHC string or a bcrypt hash.
    pub password_hash: String,
}

impl UserEntry {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}

/// A username/password pair presented by a client during its handshake.
///
/// The value only lives for the duration of a single authentication attempt.
/// Its `Debug` output never includes the password.
#[derive(Clone)]
pub struct SaslCredential {
    pub username: String,
    pub password: String,
}

impl SaslCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for SaslCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
