// src/core/state/stats.rs

//! Contains state definitions and logic for listener statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds counters describing the listener's activity since startup.
#[derive(Debug, Default)]
pub struct StatsState {
    /// The total number of connections accepted since startup.
    total_connections: AtomicU64,
    /// The total number of accept attempts that failed without stopping the listener.
    transient_accept_errors: AtomicU64,
}

impl StatsState {
    /// Creates a new `StatsState` with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments the total number of connections received.
    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total number of connections received.
    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_transient_accept_errors(&self) {
        self.transient_accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_transient_accept_errors(&self) -> u64 {
        self.transient_accept_errors.load(Ordering::Relaxed)
    }
}
