//! TCP connection supervisor.

use crate::codec::FrameCodec;
use crate::connection::PhysicalConnection;
use crate::registry::ChannelRegistry;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use hawser_remoting::error::{ConnectError, RemotingError, Result};
use hawser_remoting::{Channel, ChannelHandler, ConnectConfig, TransportClient};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpSocket;
use tracing::{debug, info};

/// Supervises one TCP connection to one remote address.
///
/// The current connection lives in a lock-free slot; readers snapshot it
/// without blocking while `connect` replaces it. Connect attempts are
/// serialized, and a connect that loses a race with `close` tears its fresh
/// connection down instead of publishing it.
pub struct TcpClient {
    config: ConnectConfig,
    handler: Arc<dyn ChannelHandler>,
    registry: Arc<ChannelRegistry>,
    connection: ArcSwapOption<PhysicalConnection>,
    closed: AtomicBool,
    // Serializes connect attempts; the slot itself is never locked.
    connect_lock: tokio::sync::Mutex<()>,
}

impl TcpClient {
    /// Create a client using the process-wide channel registry.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::Config`] for an invalid configuration.
    pub fn new(config: ConnectConfig, handler: Arc<dyn ChannelHandler>) -> Result<Self> {
        Self::with_registry(config, handler, ChannelRegistry::global())
    }

    /// Create a client using a specific channel registry.
    ///
    /// # Errors
    ///
    /// Same as [`TcpClient::new`].
    pub fn with_registry(
        config: ConnectConfig,
        handler: Arc<dyn ChannelHandler>,
        registry: Arc<ChannelRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            handler,
            registry,
            connection: ArcSwapOption::const_empty(),
            closed: AtomicBool::new(false),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn open_stream(&self) -> Result<tokio::net::TcpStream> {
        let addr = self.config.remote_addr;
        let started = Instant::now();

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_nodelay(self.config.tcp_nodelay)?;
        socket.set_keepalive(self.config.keepalive)?;

        match tokio::time::timeout(self.config.connect_timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ConnectError::Failed {
                addr,
                elapsed: started.elapsed(),
                source: e,
            }
            .into()),
            Err(_) => Err(ConnectError::TimedOut {
                addr,
                timeout: self.config.connect_timeout,
                elapsed: started.elapsed(),
            }
            .into()),
        }
    }

    async fn do_connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return Err(RemotingError::ClientClosed);
        }

        let stream = self.open_stream().await?;
        let connection = PhysicalConnection::establish(
            stream,
            self.config.remote_addr,
            FrameCodec::with_max_frame_size(self.config.max_frame_size),
            Arc::clone(&self.handler),
            Arc::clone(&self.registry),
        );

        // Retire the previous connection before publishing the new one so
        // no reader ever observes two live connections.
        if let Some(old) = self.connection.swap(None) {
            debug!(id = old.id(), "retiring previous connection");
            old.close();
            self.registry.remove_if_disconnected(&old);
        }

        if self.closed.load(Ordering::Acquire) {
            connection.close();
            self.registry.remove_if_disconnected(&connection);
            return Err(RemotingError::ClientClosed);
        }

        self.connection.store(Some(Arc::clone(&connection)));

        // A close that raced the store above must not leave the fresh
        // connection published.
        if self.closed.load(Ordering::Acquire) {
            if let Some(late) = self.connection.swap(None) {
                late.close();
                self.registry.remove_if_disconnected(&late);
            }
            return Err(RemotingError::ClientClosed);
        }

        info!(
            id = connection.id(),
            addr = %self.config.remote_addr,
            "connected"
        );
        Ok(())
    }
}

#[async_trait]
impl TransportClient for TcpClient {
    fn remote_addr(&self) -> SocketAddr {
        self.config.remote_addr
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_connected(&self) -> bool {
        self.connection
            .load()
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    fn channel(&self) -> Option<Arc<dyn Channel>> {
        let connection = self.connection.load_full()?;
        if !connection.is_connected() {
            return None;
        }
        Some(self.registry.get_or_create(&connection))
    }

    async fn connect(&self) -> Result<()> {
        self.do_connect().await
    }

    async fn reconnect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.do_connect().await
    }

    async fn disconnect(&self) {
        if let Some(connection) = self.connection.load_full() {
            self.registry.remove_if_disconnected(&connection);
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(connection) = self.connection.swap(None) {
            connection.close();
            self.registry.remove_if_disconnected(&connection);
        }
        info!(addr = %self.config.remote_addr, "client closed");
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("remote_addr", &self.config.remote_addr)
            .field("closed", &self.is_closed())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
