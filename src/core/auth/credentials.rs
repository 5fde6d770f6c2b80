// src/core/auth/credentials.rs

//! The in-memory credential store, built once from the configured user list.

use super::user::{SaslCredential, UserEntry};
use crate::core::errors::BrokerError;
use argon2::password_hash::PasswordHashString;
use argon2::{Algorithm, Argon2, Params, PasswordVerifier};
use std::collections::HashMap;
use tracing::warn;

/// Password used when verifying against the decoy hash for unknown users.
/// The verification result is always discarded.
const DECOY_PASSWORD: &str = "brokerd-decoy-password";

const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];
const BCRYPT_HASH_LEN: usize = 60;

/// A stored password hash, parsed and validated at load time.
#[derive(Clone, Debug)]
enum StoredHash {
    Argon2(PasswordHashString),
    Bcrypt(String),
}

impl StoredHash {
    fn parse(username: &str, raw: &str) -> Result<Self, BrokerError> {
        let invalid = |reason: String| BrokerError::InvalidPasswordHash {
            username: username.to_string(),
            reason,
        };

        if raw.starts_with("$argon2") {
            let parsed = PasswordHashString::new(raw).map_err(|e| invalid(e.to_string()))?;
            let hash = parsed.password_hash();
            Algorithm::new(hash.algorithm.as_str()).map_err(|e| invalid(e.to_string()))?;
            Params::try_from(&hash).map_err(|e| invalid(e.to_string()))?;
            if hash.hash.is_none() {
                return Err(invalid("missing hash output".to_string()));
            }
            Ok(StoredHash::Argon2(parsed))
        } else if BCRYPT_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            validate_bcrypt(raw).map_err(invalid)?;
            Ok(StoredHash::Bcrypt(raw.to_string()))
        } else {
            Err(invalid(
                "unsupported hash format, expected an argon2 PHC string or a bcrypt hash"
                    .to_string(),
            ))
        }
    }

    /// Verifies a plaintext password. Both verifiers compare the derived
    /// output in constant time.
    fn verify(&self, password: &str) -> bool {
        match self {
            StoredHash::Argon2(hash) => Argon2::default()
                .verify_password(password.as_bytes(), &hash.password_hash())
                .is_ok(),
            StoredHash::Bcrypt(hash) => bcrypt::verify(password, hash).unwrap_or(false),
        }
    }
}

/// Checks the shape of a modular-crypt bcrypt hash: `$2b$NN$<53 chars>`.
fn validate_bcrypt(raw: &str) -> Result<(), String> {
    if !raw.is_ascii() || raw.len() != BCRYPT_HASH_LEN {
        return Err(format!(
            "bcrypt hash must be {BCRYPT_HASH_LEN} ASCII characters"
        ));
    }
    if raw.as_bytes()[6] != b'$' {
        return Err("malformed bcrypt cost field".to_string());
    }
    let cost: u32 = raw[4..6]
        .parse()
        .map_err(|_| "malformed bcrypt cost field".to_string())?;
    if !(4..=31).contains(&cost) {
        return Err(format!("bcrypt cost {cost} is out of range (4-31)"));
    }
    Ok(())
}

/// Maps usernames to their stored password hashes.
///
/// Read-only once built, so it is shared between connection tasks without
/// any locking.
#[derive(Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, StoredHash>,
    /// An existing hash verified against on lookup misses so that an unknown
    /// username costs the same as a wrong password. This is the first stored
    /// hash, so in a store mixing Argon2 and bcrypt entries a miss only costs
    /// as much as a wrong password for users of that first entry's family.
    decoy: Option<StoredHash>,
}

impl CredentialStore {
    /// Builds the store from an ordered user list. When a username appears
    /// more than once the last entry wins.
    pub fn from_users<'a, I>(users: I) -> Result<Self, BrokerError>
    where
        I: IntoIterator<Item = &'a UserEntry>,
    {
        let mut store = CredentialStore::default();
        for user in users {
            if user.username.is_empty() {
                return Err(BrokerError::InvalidUser("username cannot be empty".to_string()));
            }
            let hash = StoredHash::parse(&user.username, &user.password_hash)?;
            if store.decoy.is_none() {
                store.decoy = Some(hash.clone());
            }
            if store.users.insert(user.username.clone(), hash).is_some() {
                warn!(
                    "Duplicate user '{}' in configuration; the last entry wins.",
                    user.username
                );
            }
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Returns true only if the username exists and the password verifies
    /// against its stored hash.
    pub fn verify(&self, credential: &SaslCredential) -> bool {
        match self.users.get(&credential.username) {
            Some(stored) => stored.verify(&credential.password),
            None => {
                if let Some(decoy) = &self.decoy {
                    let _ = decoy.verify(DECOY_PASSWORD);
                }
                false
            }
        }
    }
}
