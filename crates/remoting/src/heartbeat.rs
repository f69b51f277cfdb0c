//! Shared heartbeat monitor.
//!
//! One monitor serves every exchange client in the process: each scheduled
//! task is a single recurring tick on the shared tokio runtime, so there is
//! no timer thread per connection. The monitor holds no per-channel state
//! across ticks; every decision is made from the timestamps the endpoints
//! expose at tick time.

use crate::error::Result;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// One probe target as seen by the monitor: activity timestamps plus the
/// two actions a tick can take on it.
#[async_trait]
pub trait HeartbeatEndpoint: Send + Sync {
    /// Instant of the last inbound activity.
    fn last_read(&self) -> Instant;

    /// Instant of the last outbound activity.
    fn last_write(&self) -> Instant;

    /// Closed endpoints are skipped entirely.
    fn is_closed(&self) -> bool;

    /// Send a lightweight liveness probe. The framing is the endpoint's
    /// business; a failure here is reported by the monitor but is not itself
    /// fatal — the next tick's timeout check is authoritative.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe could not be sent.
    async fn send_probe(&self) -> Result<()>;

    /// The peer has been idle past the timeout: close the stale channel and
    /// trigger a reconnect attempt through the owning client.
    async fn expire(&self);
}

/// Supplies the current endpoint set each tick.
///
/// A callback rather than a fixed set, because the set changes across ticks
/// as connections are replaced.
pub trait ChannelProvider: Send + Sync {
    /// The endpoints to inspect on this tick.
    fn endpoints(&self) -> Vec<Arc<dyn HeartbeatEndpoint>>;
}

impl<F> ChannelProvider for F
where
    F: Fn() -> Vec<Arc<dyn HeartbeatEndpoint>> + Send + Sync,
{
    fn endpoints(&self) -> Vec<Arc<dyn HeartbeatEndpoint>> {
        self()
    }
}

/// Handle to one scheduled heartbeat task.
#[derive(Debug)]
pub struct HeartbeatTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    /// Stop future ticks. An in-flight tick completes; no new tick starts.
    /// Safe to call more than once and concurrently with a tick.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Whether the tick task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// The shared periodic scheduler for heartbeat checks.
///
/// Process-wide by default ([`HeartbeatMonitor::global`]); standalone
/// instances behave identically and exist for tests. A client's `close`
/// cancels its own task and never touches the monitor itself.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor;

static GLOBAL: OnceLock<HeartbeatMonitor> = OnceLock::new();

impl HeartbeatMonitor {
    /// Create a standalone monitor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The process-wide monitor instance, created on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Register a recurring heartbeat check.
    ///
    /// Every `interval` the provider's endpoints are inspected: an endpoint
    /// whose read side has been idle past `timeout` is expired; one idle
    /// past `interval` on either side receives a probe. Ticks for one task
    /// never overlap.
    ///
    /// `interval` must be non-zero; callers disable heartbeating by not
    /// scheduling a task at all.
    pub fn schedule(
        &self,
        provider: Arc<dyn ChannelProvider>,
        interval: Duration,
        timeout: Duration,
    ) -> HeartbeatTask {
        let (cancel, mut cancelled) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *cancelled.borrow() {
                            break;
                        }
                        Self::tick(provider.as_ref(), interval, timeout).await;
                    }
                    _ = cancelled.changed() => break,
                }
            }
            debug!("heartbeat task stopped");
        });

        HeartbeatTask { cancel, handle }
    }

    async fn tick(provider: &dyn ChannelProvider, interval: Duration, timeout: Duration) {
        let now = Instant::now();
        for endpoint in provider.endpoints() {
            if endpoint.is_closed() {
                continue;
            }
            let read_idle = now.saturating_duration_since(endpoint.last_read());
            let write_idle = now.saturating_duration_since(endpoint.last_write());

            // A peer we never hear from is dead, no matter how much we
            // write to it.
            if read_idle > timeout {
                warn!(
                    ?read_idle,
                    ?timeout,
                    "heartbeat timeout, expiring channel"
                );
                endpoint.expire().await;
            } else if read_idle > interval || write_idle > interval {
                if let Err(e) = endpoint.send_probe().await {
                    warn!("failed to send heartbeat probe: {e}");
                }
            }
        }
    }
}
