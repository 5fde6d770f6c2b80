// src/core/auth/gate.rs

//! The authentication gate connection handlers consult during their handshake.

use super::credentials::CredentialStore;
use super::user::SaslCredential;
use crate::config::Config;
use crate::core::errors::BrokerError;
use crate::core::metrics;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Decides whether a presented credential is valid.
#[derive(Debug)]
pub struct AuthGate {
    store: CredentialStore,
    /// Delay applied to failed asynchronous attempts to slow down guessing.
    failure_delay: Duration,
}

impl AuthGate {
    pub fn new(store: CredentialStore, failure_delay: Duration) -> Self {
        Self {
            store,
            failure_delay,
        }
    }

    /// Builds the credential store from the configured users.
    pub fn from_config(config: &Config) -> Result<Self, BrokerError> {
        let store = CredentialStore::from_users(&config.users)?;
        info!("Loaded {} user(s) into the credential store.", store.len());
        Ok(Self::new(store, config.auth.failure_delay))
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Checks a credential synchronously. Password verification is CPU bound;
    /// async callers should prefer [`AuthGate::authenticate_async`].
    pub fn authenticate(&self, credential: &SaslCredential) -> bool {
        let accepted = !credential.password.is_empty() && self.store.verify(credential);
        record_outcome(&credential.username, accepted);
        accepted
    }

    /// Runs verification on the blocking pool and delays failed attempts.
    pub async fn authenticate_async(self: &Arc<Self>, credential: SaslCredential) -> bool {
        let gate = Arc::clone(self);
        let accepted =
            match tokio::task::spawn_blocking(move || gate.authenticate(&credential)).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Authentication task failed: {e}");
                    false
                }
            };

        if !accepted && !self.failure_delay.is_zero() {
            tokio::time::sleep(self.failure_delay).await;
        }
        accepted
    }
}

fn record_outcome(username: &str, accepted: bool) {
    if accepted {
        metrics::AUTH_ATTEMPTS_TOTAL
            .with_label_values(&["success"])
            .inc();
        info!(target: "audit", username, outcome = "success", "Authentication succeeded");
    } else {
        metrics::AUTH_ATTEMPTS_TOTAL
            .with_label_values(&["failure"])
            .inc();
        warn!(target: "audit", username, outcome = "failure", "Authentication failed");
    }
}

/// Hashes a password into an Argon2id PHC string with a random salt, suitable
/// for the `password_hash` field of a user entry.
pub fn hash_password(password: &str) -> Result<String, BrokerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BrokerError::Hashing(e.to_string()))
}
