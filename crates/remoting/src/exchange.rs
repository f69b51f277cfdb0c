//! Exchange client facade.
//!
//! [`ExchangeClient`] is the single entry point upper layers hold: it owns a
//! [`TransportClient`] (the connection supervisor), an [`ExchangeChannel`]
//! (the request/response correlation layer), and the client's slot in the
//! shared heartbeat monitor. It tracks its own lifecycle so that a closed
//! client rejects every operation instead of racing teardown.

use crate::channel::Attributes;
use crate::client::TransportClient;
use crate::config::HeartbeatConfig;
use crate::error::{RemotingError, Result};
use crate::heartbeat::{HeartbeatEndpoint, HeartbeatMonitor, HeartbeatTask};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const STATE_CREATED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// A response that has been promised but may not have arrived yet.
///
/// Produced by [`ExchangeChannel::request`]; resolved by the correlation
/// layer when the matching response frame arrives.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl PendingResponse {
    /// Create a pending response together with the sender that resolves it.
    #[must_use]
    pub fn channel() -> (oneshot::Sender<Result<Bytes>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the response.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::ChannelClosed`] if the resolving side was
    /// dropped before a response arrived, or whatever error it resolved with.
    pub async fn wait(self) -> Result<Bytes> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(RemotingError::ChannelClosed),
        }
    }
}

/// The request/response correlation layer over a transport client.
///
/// Implementations own the framing of requests, responses and heartbeat
/// probes, and track in-flight requests so a response can resolve its
/// [`PendingResponse`].
#[async_trait]
pub trait ExchangeChannel: Send + Sync {
    /// Issue a request and return a handle to its future response.
    ///
    /// # Errors
    ///
    /// Fails if the request could not be sent.
    async fn request(&self, payload: Bytes, timeout: Option<Duration>) -> Result<PendingResponse>;

    /// Send a one-way message with no response expected.
    ///
    /// # Errors
    ///
    /// Fails if the message could not be sent.
    async fn send(&self, payload: Bytes, wait_sent: bool) -> Result<()>;

    /// Send a heartbeat probe frame.
    ///
    /// # Errors
    ///
    /// Fails if the probe could not be sent.
    async fn send_heartbeat(&self) -> Result<()>;

    /// Whether the underlying transport currently has a live connection.
    fn is_connected(&self) -> bool;

    /// Stop accepting new requests; in-flight ones may still resolve.
    fn start_close(&self);

    /// Close the correlation layer, failing in-flight requests after the
    /// optional grace period.
    async fn close(&self, timeout: Option<Duration>);
}

/// Facade over one remote endpoint: connection supervision, request
/// dispatch, and heartbeat scheduling behind a single handle.
///
/// The facade survives reconnects: its attribute store and identity are
/// stable while the physical connection underneath is replaced. Closing the
/// facade cancels its heartbeat task and tears down its own connection only;
/// the shared monitor keeps serving other clients.
pub struct ExchangeClient {
    client: Arc<dyn TransportClient>,
    exchange: Arc<dyn ExchangeChannel>,
    heartbeat: HeartbeatConfig,
    state: AtomicU8,
    attributes: Attributes,
    // Fallback activity timestamp for ticks that race a reconnect window.
    last_alive: RwLock<Instant>,
    heartbeat_task: Mutex<Option<HeartbeatTask>>,
}

impl ExchangeClient {
    /// Create an exchange client and register it with the process-wide
    /// heartbeat monitor.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::Config`] when the heartbeat timeout is less
    /// than twice the interval.
    pub fn new(
        client: Arc<dyn TransportClient>,
        exchange: Arc<dyn ExchangeChannel>,
        heartbeat: HeartbeatConfig,
    ) -> Result<Arc<Self>> {
        Self::with_monitor(client, exchange, heartbeat, HeartbeatMonitor::global())
    }

    /// Create an exchange client registered with a specific monitor.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::new`].
    pub fn with_monitor(
        client: Arc<dyn TransportClient>,
        exchange: Arc<dyn ExchangeChannel>,
        heartbeat: HeartbeatConfig,
        monitor: &HeartbeatMonitor,
    ) -> Result<Arc<Self>> {
        heartbeat.validate()?;

        let facade = Arc::new(Self {
            client,
            exchange,
            heartbeat,
            state: AtomicU8::new(STATE_CREATED),
            attributes: Attributes::new(),
            last_alive: RwLock::new(Instant::now()),
            heartbeat_task: Mutex::new(None),
        });

        if facade.heartbeat.is_enabled() {
            // The provider holds a weak reference so a dropped facade
            // disappears from the tick instead of being kept alive by it.
            let weak: Weak<Self> = Arc::downgrade(&facade);
            let provider = Arc::new(move || {
                weak.upgrade().map_or_else(Vec::new, |facade| {
                    vec![facade as Arc<dyn HeartbeatEndpoint>]
                })
            });
            let task = monitor.schedule(provider, facade.heartbeat.interval, facade.heartbeat.timeout);
            *facade.heartbeat_task.lock() = Some(task);
            debug!(
                interval = ?facade.heartbeat.interval,
                timeout = ?facade.heartbeat.timeout,
                "heartbeat scheduled"
            );
        }

        Ok(facade)
    }

    /// Establish the initial connection.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::ClientClosed`] on a closed client, otherwise
    /// the connect attempt's error.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_not_closed()?;
        self.client.connect().await?;
        let _ = self.state.compare_exchange(
            STATE_CREATED,
            STATE_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.mark_alive();
        Ok(())
    }

    /// Re-establish the connection if it is not currently live.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ExchangeClient::connect`].
    pub async fn reconnect(&self) -> Result<()> {
        self.ensure_not_closed()?;
        self.client.reconnect().await?;
        self.mark_alive();
        Ok(())
    }

    /// Issue a request with no per-request timeout.
    ///
    /// # Errors
    ///
    /// Fails with [`RemotingError::ClientClosed`] on a closed client and
    /// [`RemotingError::NotConnected`] when no live connection is published.
    pub async fn request(&self, payload: Bytes) -> Result<PendingResponse> {
        self.ensure_live()?;
        self.exchange.request(payload, None).await
    }

    /// Issue a request with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::request`].
    pub async fn request_with_timeout(
        &self,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<PendingResponse> {
        self.ensure_live()?;
        self.exchange.request(payload, Some(timeout)).await
    }

    /// Send a one-way message with no response expected.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::request`].
    pub async fn send(&self, payload: Bytes, wait_sent: bool) -> Result<()> {
        self.ensure_live()?;
        self.exchange.send(payload, wait_sent).await
    }

    /// Begin a graceful close: new requests are rejected, in-flight ones may
    /// still resolve. Terminal once begun.
    pub fn start_close(&self) {
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state >= STATE_CLOSING {
                return;
            }
            if self
                .state
                .compare_exchange(state, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.exchange.start_close();
                return;
            }
        }
    }

    /// Close the client immediately.
    pub async fn close(&self) {
        self.do_close(None).await;
    }

    /// Close the client after giving in-flight requests a grace period.
    pub async fn close_with_timeout(&self, timeout: Duration) {
        self.start_close();
        self.do_close(Some(timeout)).await;
    }

    async fn do_close(&self, timeout: Option<Duration>) {
        let prev = self.state.swap(STATE_CLOSED, Ordering::AcqRel);
        if prev == STATE_CLOSED {
            return;
        }

        // Cancel first so no tick probes a channel mid-teardown.
        let task = self.heartbeat_task.lock().take();
        if let Some(task) = task {
            task.cancel();
        }

        self.exchange.close(timeout).await;
        self.client.close().await;
        info!(addr = %self.client.remote_addr(), "exchange client closed");
    }

    /// Whether a live connection is currently published.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPEN && self.client.is_connected()
    }

    /// Whether the client is closing or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) >= STATE_CLOSING
    }

    /// The remote address this client talks to.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.client.remote_addr()
    }

    /// The local address of the current connection, if one is live.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.client.channel().and_then(|channel| channel.local_addr())
    }

    /// Metadata attached to this client. Survives reconnects.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) >= STATE_CLOSING {
            return Err(RemotingError::ClientClosed);
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        self.ensure_not_closed()?;
        if !self.client.is_connected() {
            return Err(RemotingError::NotConnected {
                addr: self.client.remote_addr(),
            });
        }
        Ok(())
    }

    fn mark_alive(&self) {
        *self.last_alive.write() = Instant::now();
    }

    #[cfg(test)]
    fn has_heartbeat_task(&self) -> bool {
        self.heartbeat_task.lock().is_some()
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("remote_addr", &self.client.remote_addr())
            .field("state", &self.state.load(Ordering::Acquire))
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HeartbeatEndpoint for ExchangeClient {
    fn last_read(&self) -> Instant {
        self.client
            .channel()
            .map_or_else(|| *self.last_alive.read(), |channel| channel.last_read())
    }

    fn last_write(&self) -> Instant {
        self.client
            .channel()
            .map_or_else(|| *self.last_alive.read(), |channel| channel.last_write())
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) >= STATE_CLOSING
    }

    async fn send_probe(&self) -> Result<()> {
        self.exchange.send_heartbeat().await
    }

    async fn expire(&self) {
        warn!(
            addr = %self.client.remote_addr(),
            "peer unresponsive past heartbeat timeout, reconnecting"
        );
        if let Some(channel) = self.client.channel() {
            channel.close().await;
        }
        self.client.disconnect().await;
        match self.client.reconnect().await {
            Ok(()) => self.mark_alive(),
            Err(e) => warn!("reconnect after heartbeat timeout failed: {e}"),
        }
    }
}
