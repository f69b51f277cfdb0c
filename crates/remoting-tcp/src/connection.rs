//! One established TCP connection and its I/O tasks.

use crate::codec::FrameCodec;
use crate::registry::ChannelRegistry;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hawser_remoting::error::{RemotingError, Result};
use hawser_remoting::{Channel, ChannelHandler};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Process-unique connection identifiers; the registry keys on these.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const OUTGOING_QUEUE_SIZE: usize = 256;

type OutgoingEntry = (Bytes, Option<oneshot::Sender<Result<()>>>);

/// One established TCP connection: the write queue, the activity
/// timestamps, and the spawned read/write tasks.
///
/// A connection is immutable once established; reconnecting means building
/// a new one and retiring this one. The channel wrapper over it lives in
/// the [`ChannelRegistry`].
pub struct PhysicalConnection {
    id: u64,
    remote_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    outgoing_tx: mpsc::Sender<OutgoingEntry>,
    connected: AtomicBool,
    closed: AtomicBool,
    last_read: RwLock<Instant>,
    last_write: RwLock<Instant>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PhysicalConnection {
    /// Wrap an established stream: split it, spawn the read and write
    /// tasks, and fire the handler's `connected` event.
    pub fn establish(
        stream: TcpStream,
        remote_addr: SocketAddr,
        codec: FrameCodec,
        handler: Arc<dyn ChannelHandler>,
        registry: Arc<ChannelRegistry>,
    ) -> Arc<Self> {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let local_addr = stream.local_addr().ok();
        let (mut sink, mut frames) = Framed::new(stream, codec).split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<OutgoingEntry>(OUTGOING_QUEUE_SIZE);

        let now = Instant::now();
        let connection = Arc::new(Self {
            id,
            remote_addr,
            local_addr,
            outgoing_tx,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            last_read: RwLock::new(now),
            last_write: RwLock::new(now),
            tasks: Mutex::new(Vec::with_capacity(2)),
        });

        // Register the wrapper before any task runs, so the registry is
        // only ever inserted into here; a later removal by the supervisor
        // cannot be undone by a straggling I/O task.
        let channel = registry.get_or_create(&connection);

        let write_task = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                while let Some((payload, ack)) = outgoing_rx.recv().await {
                    match sink.send(payload).await {
                        Ok(()) => {
                            *connection.last_write.write() = Instant::now();
                            if let Some(ack) = ack {
                                let _ = ack.send(Ok(()));
                            }
                        }
                        Err(e) => {
                            warn!(id = connection.id, "write failed: {e}");
                            if let Some(ack) = ack {
                                let _ = ack.send(Err(RemotingError::Send {
                                    reason: e.to_string(),
                                }));
                            }
                            connection.connected.store(false, Ordering::Release);
                            break;
                        }
                    }
                }
            })
        };

        let read_task = {
            let connection = Arc::clone(&connection);
            let handler = Arc::clone(&handler);
            let registry = Arc::clone(&registry);
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                loop {
                    match frames.next().await {
                        Some(Ok(payload)) => {
                            *connection.last_read.write() = Instant::now();
                            let channel = Arc::clone(&channel) as Arc<dyn Channel>;
                            handler.received(channel, payload).await;
                        }
                        Some(Err(e)) => {
                            warn!(id = connection.id, "read failed: {e}");
                            let channel = Arc::clone(&channel) as Arc<dyn Channel>;
                            handler.caught(channel, RemotingError::Io(e)).await;
                            break;
                        }
                        None => {
                            debug!(id = connection.id, "peer closed the connection");
                            break;
                        }
                    }
                }

                connection.connected.store(false, Ordering::Release);
                if let Some(channel) = registry.remove_if_disconnected(&connection) {
                    handler.disconnected(channel).await;
                }
            })
        };

        *connection.tasks.lock() = vec![write_task, read_task];

        tokio::spawn(async move {
            handler.connected(channel).await;
        });

        connection
    }

    /// Process-unique identifier of this connection.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Address of the remote peer.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Local address of the connection, if known at establish time.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the connection is still live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the connection has been explicitly closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Instant of the last decoded inbound frame.
    #[must_use]
    pub fn last_read(&self) -> Instant {
        *self.last_read.read()
    }

    /// Instant of the last flushed outbound frame.
    #[must_use]
    pub fn last_write(&self) -> Instant {
        *self.last_write.read()
    }

    /// Enqueue an outbound payload.
    ///
    /// With `wait_sent` the call resolves only after the frame has been
    /// written and flushed; without it, once the frame is queued.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::ChannelClosed`] when the connection is no
    /// longer live, or the write error when waiting for the flush.
    pub async fn send(&self, payload: Bytes, wait_sent: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(RemotingError::ChannelClosed);
        }

        if wait_sent {
            let (ack_tx, ack_rx) = oneshot::channel();
            self.outgoing_tx
                .send((payload, Some(ack_tx)))
                .await
                .map_err(|_| RemotingError::ChannelClosed)?;
            ack_rx.await.map_err(|_| RemotingError::ChannelClosed)?
        } else {
            self.outgoing_tx
                .send((payload, None))
                .await
                .map_err(|_| RemotingError::ChannelClosed)
        }
    }

    /// Tear the connection down. Idempotent and synchronous; the I/O tasks
    /// are aborted, not drained.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connected.store(false, Ordering::Release);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        debug!(id = self.id, addr = %self.remote_addr, "connection closed");
    }
}

impl std::fmt::Debug for PhysicalConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("local_addr", &self.local_addr)
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
