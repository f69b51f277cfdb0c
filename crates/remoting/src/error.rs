//! Error types for the remoting client stack.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for remoting operations.
pub type Result<T> = std::result::Result<T, RemotingError>;

/// Main error type for remoting operations.
#[derive(Debug, Error)]
pub enum RemotingError {
    /// Connect attempt failed.
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Invalid configuration, rejected at construction time.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An operation required a live connection and there was none.
    #[error("no live connection to {addr}")]
    NotConnected {
        /// The remote address the client is configured for.
        addr: SocketAddr,
    },

    /// The client has been closed; no further operations are accepted.
    #[error("client is closed")]
    ClientClosed,

    /// A channel closed underneath an in-flight operation.
    #[error("channel closed")]
    ChannelClosed,

    /// A send was accepted but could not be completed.
    #[error("send failed: {reason}")]
    Send {
        /// What went wrong on the write path.
        reason: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Connection-establishment errors.
///
/// Always carries enough context (target address, elapsed time, timeout,
/// underlying cause) to diagnose a network-level failure without inspecting
/// lower layers.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connect attempt did not complete within the configured timeout.
    #[error("connect to {addr} timed out after {elapsed:?} (timeout: {timeout:?})")]
    TimedOut {
        /// The address we tried to connect to.
        addr: SocketAddr,
        /// The configured connect timeout.
        timeout: Duration,
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// The connect attempt failed outright (refused, unreachable, resolution).
    #[error("connect to {addr} failed after {elapsed:?}: {source}")]
    Failed {
        /// The address we tried to connect to.
        addr: SocketAddr,
        /// Time spent before the failure surfaced.
        elapsed: Duration,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// The address the failed attempt targeted.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        match self {
            Self::TimedOut { addr, .. } | Self::Failed { addr, .. } => *addr,
        }
    }

    /// Time spent in the failed attempt.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::TimedOut { elapsed, .. } | Self::Failed { elapsed, .. } => *elapsed,
        }
    }
}

/// Configuration errors, fatal at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The heartbeat timeout must be at least twice the interval.
    #[error("heartbeat timeout {timeout:?} must be at least twice the interval {interval:?}")]
    HeartbeatTimeoutTooShort {
        /// Configured heartbeat interval.
        interval: Duration,
        /// Configured heartbeat timeout.
        timeout: Duration,
    },

    /// The connect timeout must be a positive duration.
    #[error("connect timeout must be a positive duration")]
    InvalidConnectTimeout,
}
