//! Process-wide connection-to-channel registry.

use crate::channel::TcpChannel;
use crate::connection::PhysicalConnection;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Maps live connections to their unique channel wrapper.
///
/// Upholds the one-wrapper-per-connection rule under concurrency: two tasks
/// racing to wrap the same connection observe the same [`TcpChannel`].
/// Removal is guarded on the connection actually being disconnected, so a
/// stale cleanup can never evict a live channel.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<u64, Arc<TcpChannel>>,
}

static GLOBAL: OnceLock<Arc<ChannelRegistry>> = OnceLock::new();

impl ChannelRegistry {
    /// Create a standalone registry. Most callers want [`ChannelRegistry::global`];
    /// standalone instances exist for tests.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(Self::new))
    }

    /// The channel wrapper for a connection, creating it if absent.
    ///
    /// A wrapper is only cached while its connection is live; for a dead
    /// connection an uncached wrapper is handed out, so the registry never
    /// accumulates entries for connections that can no longer be removed.
    pub fn get_or_create(&self, connection: &Arc<PhysicalConnection>) -> Arc<TcpChannel> {
        if !connection.is_connected() {
            if let Some(existing) = self.lookup(connection.id()) {
                return existing;
            }
            return Arc::new(TcpChannel::new(Arc::clone(connection)));
        }
        Arc::clone(
            &self
                .channels
                .entry(connection.id())
                .or_insert_with(|| Arc::new(TcpChannel::new(Arc::clone(connection)))),
        )
    }

    /// Look up the wrapper for a connection id without creating one.
    #[must_use]
    pub fn lookup(&self, connection_id: u64) -> Option<Arc<TcpChannel>> {
        self.channels
            .get(&connection_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a connection's wrapper, but only if the connection reports
    /// disconnected. Returns the removed wrapper.
    pub fn remove_if_disconnected(
        &self,
        connection: &PhysicalConnection,
    ) -> Option<Arc<TcpChannel>> {
        if connection.is_connected() {
            return None;
        }
        let removed = self.channels.remove(&connection.id()).map(|(_, channel)| channel);
        if removed.is_some() {
            debug!(id = connection.id(), "channel removed from registry");
        }
        removed
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
