//! Client configuration.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default maximum frame size (10 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Heartbeat schedule for one exchange client.
///
/// A zero interval disables heartbeating entirely; otherwise the timeout
/// must be at least twice the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Period between liveness checks.
    pub interval: Duration,
    /// Idle time past which the peer is declared unresponsive.
    pub timeout: Duration,
}

impl HeartbeatConfig {
    /// Schedule with the given interval and the default timeout of three
    /// times the interval.
    #[must_use]
    pub const fn for_interval(interval: Duration) -> Self {
        Self {
            interval,
            timeout: interval.saturating_mul(3),
        }
    }

    /// No heartbeating: no task is ever scheduled.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }

    /// Whether a heartbeat task should be scheduled at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Validate the interval/timeout relationship.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HeartbeatTimeoutTooShort`] when the timeout is
    /// less than twice the interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_enabled() && self.timeout < self.interval * 2 {
            return Err(ConfigError::HeartbeatTimeoutTooShort {
                interval: self.interval,
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::for_interval(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

/// Connection parameters for one transport client.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Remote address to connect to.
    pub remote_addr: SocketAddr,
    /// Maximum time one connect attempt may take.
    pub connect_timeout: Duration,
    /// Whether to set TCP_NODELAY on new connections.
    pub tcp_nodelay: bool,
    /// Whether to set SO_KEEPALIVE on new connections.
    pub keepalive: bool,
    /// Maximum inbound/outbound frame size.
    pub max_frame_size: usize,
}

impl ConnectConfig {
    /// Configuration for the given remote address with default options.
    #[must_use]
    pub const fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tcp_nodelay: true,
            keepalive: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set TCP_NODELAY.
    #[must_use]
    pub const fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set SO_KEEPALIVE.
    #[must_use]
    pub const fn keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    /// Set the maximum frame size.
    #[must_use]
    pub const fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConnectTimeout`] for a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidConnectTimeout);
        }
        Ok(())
    }
}
