// src/server/accept_policy.rs

//! Decides what the accept loop does after a failed `accept`.

use std::fmt;
use std::io;
use std::time::Duration;

/// What the accept loop should do after an accept error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptAction {
    /// The failure belonged to a single connection attempt; accept again.
    Retry,
    /// The process is out of a resource that may free up; pause, then accept again.
    RetryAfter(Duration),
    /// The listener itself is unusable; stop accepting.
    Stop,
}

impl AcceptAction {
    /// Label used for the accept error metric.
    pub fn as_label(&self) -> &'static str {
        match self {
            AcceptAction::Retry => "transient",
            AcceptAction::RetryAfter(_) => "exhausted",
            AcceptAction::Stop => "fatal",
        }
    }
}

/// Classifies accept errors for the acceptor.
pub trait AcceptErrorPolicy: Send + Sync + fmt::Debug {
    fn classify(&self, err: &io::Error) -> AcceptAction;
}

/// Retries errors tied to one connection attempt, backs off on descriptor or
/// buffer exhaustion, and stops on everything else.
#[derive(Debug, Clone)]
pub struct DefaultAcceptPolicy {
    backoff: Duration,
}

impl DefaultAcceptPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }
}

impl Default for DefaultAcceptPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl AcceptErrorPolicy for DefaultAcceptPolicy {
    fn classify(&self, err: &io::Error) -> AcceptAction {
        if is_resource_exhaustion(err) {
            return AcceptAction::RetryAfter(self.backoff);
        }
        if is_pending_network_error(err) {
            return AcceptAction::Retry;
        }
        match err.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut => AcceptAction::Retry,
            _ => AcceptAction::Stop,
        }
    }
}

fn is_resource_exhaustion(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            err.raw_os_error(),
            Some(code) if code == libc::EMFILE
                || code == libc::ENFILE
                || code == libc::ENOBUFS
                || code == libc::ENOMEM
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Linux reports network errors already pending on the new socket from
/// `accept` itself; accept(2) says to retry on these.
fn is_pending_network_error(err: &io::Error) -> bool {
    #[cfg(target_os = "linux")]
    {
        matches!(
            err.raw_os_error(),
            Some(code) if code == libc::EPROTO
                || code == libc::EPERM
                || code == libc::ENETDOWN
                || code == libc::ENOPROTOOPT
                || code == libc::EHOSTDOWN
                || code == libc::ENONET
                || code == libc::EHOSTUNREACH
                || code == libc::EOPNOTSUPP
                || code == libc::ENETUNREACH
        )
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = err;
        false
    }
}
