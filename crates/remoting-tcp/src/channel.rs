//! Channel wrapper over a physical TCP connection.

use crate::connection::PhysicalConnection;
use async_trait::async_trait;
use bytes::Bytes;
use hawser_remoting::error::Result;
use hawser_remoting::{Attributes, Channel};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// The logical channel over one physical TCP connection.
///
/// Created and owned by the [`ChannelRegistry`](crate::ChannelRegistry) so
/// there is exactly one wrapper per live connection; the attribute store
/// belongs to the wrapper and disappears with it.
#[derive(Debug)]
pub struct TcpChannel {
    connection: Arc<PhysicalConnection>,
    attributes: Attributes,
}

impl TcpChannel {
    pub(crate) fn new(connection: Arc<PhysicalConnection>) -> Self {
        Self {
            connection,
            attributes: Attributes::new(),
        }
    }

    /// Identifier of the wrapped connection.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.connection.id()
    }
}

#[async_trait]
impl Channel for TcpChannel {
    fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.connection.local_addr()
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    fn last_read(&self) -> Instant {
        self.connection.last_read()
    }

    fn last_write(&self) -> Instant {
        self.connection.last_write()
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    async fn send(&self, payload: Bytes, wait_sent: bool) -> Result<()> {
        self.connection.send(payload, wait_sent).await
    }

    async fn close(&self) {
        self.connection.close();
    }
}
