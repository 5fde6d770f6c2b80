// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the listener and the auth gate.
//!
//! This module uses `lazy_static` so that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    /// The number of connections currently held in the registry.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("brokerd_connected_clients", "Number of currently connected clients.").unwrap();

    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("brokerd_connections_received_total", "Total number of connections received.").unwrap();
    /// Failed accept attempts, labeled by how the accept policy classified them.
    pub static ref ACCEPT_ERRORS_TOTAL: CounterVec =
        register_counter_vec!("brokerd_accept_errors_total", "Total number of failed accept attempts, labeled by classification.", &["kind"]).unwrap();
    /// Authentication attempts, labeled by outcome.
    pub static ref AUTH_ATTEMPTS_TOTAL: CounterVec =
        register_counter_vec!("brokerd_auth_attempts_total", "Total number of authentication attempts, labeled by outcome.", &["outcome"]).unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
