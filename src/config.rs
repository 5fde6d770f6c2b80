// src/config.rs

//! Manages server configuration: loading, resolving the user list, and validation.

use crate::core::auth::UserEntry;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::info;

/// Represents the data structure of the separate users file (e.g., users.json).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UsersFile {
    pub users: Vec<UserEntry>,
}

/// Settings for the authentication gate.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// How long a failed asynchronous authentication attempt is held before
    /// the handler sees the result.
    #[serde(with = "humantime_serde", default = "default_failure_delay")]
    pub failure_delay: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            failure_delay: default_failure_delay(),
        }
    }
}

fn default_failure_delay() -> Duration {
    Duration::from_millis(100)
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9419
}

/// A raw representation of the config file before the users file is merged in.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_protocol_version")]
    protocol_version: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    users: Vec<UserEntry>,
    #[serde(default)]
    users_file: Option<String>,
    #[serde(with = "humantime_serde", default = "default_shutdown_grace")]
    shutdown_grace: Duration,
    #[serde(with = "humantime_serde", default = "default_accept_backoff")]
    accept_backoff: Duration,
    #[serde(default)]
    auth: AuthConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5672
}
fn default_protocol_version() -> String {
    "amqp-0-9-1".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}
fn default_accept_backoff() -> Duration {
    Duration::from_millis(100)
}

/// The resolved, validated server configuration. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// The protocol version handed to every connection handler.
    pub protocol_version: String,
    pub log_level: String,
    /// Inline users followed by the users loaded from `users_file`.
    pub users: Vec<UserEntry>,
    pub users_file: Option<String>,
    /// How long `stop` waits for connection tasks before detaching them.
    pub shutdown_grace: Duration,
    /// Pause after an accept error caused by resource exhaustion.
    pub accept_backoff: Duration,
    pub auth: AuthConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protocol_version: default_protocol_version(),
            log_level: default_log_level(),
            users: Vec::new(),
            users_file: None,
            shutdown_grace: default_shutdown_grace(),
            accept_backoff: default_accept_backoff(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses a TOML document, merges in the users file if one is named, and
    /// validates the result.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;

        let mut users = raw_config.users;
        if let Some(path) = &raw_config.users_file {
            let file_users = load_users_file(path)?;
            info!("Loaded {} user(s) from '{}'.", file_users.len(), path);
            users.extend(file_users);
        }

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            protocol_version: raw_config.protocol_version,
            log_level: raw_config.log_level,
            users,
            users_file: raw_config.users_file,
            shutdown_grace: raw_config.shutdown_grace,
            accept_backoff: raw_config.accept_backoff,
            auth: raw_config.auth,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// The `host:port` string the listener binds to.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Validates the resolved configuration to ensure logical consistency.
    /// Password hashes are checked when the credential store is built.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(anyhow!("protocol_version cannot be empty"));
        }
        if let Some(i) = self.users.iter().position(|u| u.username.is_empty()) {
            return Err(anyhow!("user #{} has an empty username", i + 1));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}

fn load_users_file(path: &str) -> Result<Vec<UserEntry>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read users file at '{path}'"))?;
    let file: UsersFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse users file '{path}'"))?;
    Ok(file.users)
}
