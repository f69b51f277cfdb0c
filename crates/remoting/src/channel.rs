//! Logical channel abstraction over one physical connection.

use crate::error::{RemotingError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Open key-value metadata attached to a channel by upper layers.
///
/// Concurrent and lock-free; safe to read and mutate from any task.
#[derive(Debug, Default)]
pub struct Attributes {
    entries: DashMap<String, String>,
}

impl Attributes {
    /// Create an empty attribute store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Set an attribute, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove an attribute, returning the previous value if present.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Whether an attribute is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// A logical channel wrapping one established physical connection.
///
/// At most one `Channel` wraps a given physical connection at any time; the
/// wrapper is created on connect (or lazily on first use) and destroyed when
/// the connection is observed disconnected. Holders of a channel reference
/// must treat it as a snapshot: a concurrent reconnect may retire it at any
/// point, after which `is_connected` reports false.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;

    /// Local address of the connection, if known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Whether the underlying physical connection is currently connected.
    fn is_connected(&self) -> bool;

    /// Whether this channel has been closed.
    fn is_closed(&self) -> bool;

    /// Instant of the last inbound activity.
    fn last_read(&self) -> Instant;

    /// Instant of the last outbound activity.
    fn last_write(&self) -> Instant;

    /// Metadata attached to this channel by upper layers.
    fn attributes(&self) -> &Attributes;

    /// Send an opaque payload on this channel.
    ///
    /// With `wait_sent` the call resolves once the payload has been written
    /// and flushed; without it the payload is only enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is not connected or the write fails.
    async fn send(&self, payload: Bytes, wait_sent: bool) -> Result<()>;

    /// Close the channel. Idempotent; teardown failures are logged, not
    /// surfaced.
    async fn close(&self);
}

/// Inbound event seam installed on every physical connection before connect.
///
/// This is the "handle" stage of the connection pipeline: the transport
/// decodes frames and hands the opaque payloads (and lifecycle events) to
/// the handler, which is typically the request/response correlation layer.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// A new connection has been established and wrapped.
    async fn connected(&self, channel: Arc<dyn Channel>) {
        let _ = channel;
    }

    /// The connection has been observed disconnected and its wrapper removed.
    async fn disconnected(&self, channel: Arc<dyn Channel>) {
        let _ = channel;
    }

    /// A decoded inbound payload arrived on the channel.
    async fn received(&self, channel: Arc<dyn Channel>, payload: Bytes);

    /// The connection hit a transport-level error.
    async fn caught(&self, channel: Arc<dyn Channel>, error: RemotingError) {
        let _ = (channel, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_roundtrip() {
        let attrs = Attributes::new();
        assert!(!attrs.contains("token"));

        attrs.set("token", "abc123");
        assert!(attrs.contains("token"));
        assert_eq!(attrs.get("token").as_deref(), Some("abc123"));

        attrs.set("token", "def456");
        assert_eq!(attrs.get("token").as_deref(), Some("def456"));

        assert_eq!(attrs.remove("token").as_deref(), Some("def456"));
        assert!(!attrs.contains("token"));
        assert!(attrs.remove("token").is_none());
    }
}
