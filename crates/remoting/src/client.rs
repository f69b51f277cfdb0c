//! Connection-supervisor contract for one logical client.

use crate::channel::Channel;
use crate::error::{RemotingError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;

/// The connection supervisor for one logical client: owns the physical
/// connection, swaps it on reconnect, and tears it down on close.
///
/// Implementations guarantee that at no observable instant two physical
/// connections appear as "current", and that a `close` racing an in-flight
/// `connect` never leaves the late connection published.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// The remote address this client connects to.
    fn remote_addr(&self) -> SocketAddr;

    /// Whether the client has been closed. Terminal.
    fn is_closed(&self) -> bool;

    /// Whether a live connection is currently published.
    fn is_connected(&self) -> bool;

    /// The logical channel for the current connection, or `None` when no
    /// live connection is published.
    ///
    /// "No connection" is a normal transient state during reconnects, not an
    /// error; callers must take a fresh snapshot per use.
    fn channel(&self) -> Option<Arc<dyn Channel>>;

    /// Establish a connection to the configured remote address, replacing
    /// and closing any prior connection.
    ///
    /// Blocks the caller until success, the connect timeout, or an error,
    /// whichever comes first. Never retries internally.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::Connect`] on timeout or failure, and
    /// [`RemotingError::ClientClosed`] if the client was closed.
    async fn connect(&self) -> Result<()>;

    /// Re-establish the connection if it is not currently live. One attempt.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`TransportClient::connect`].
    async fn reconnect(&self) -> Result<()>;

    /// Remove the current connection's channel wrapper if the connection
    /// reports disconnected. Best-effort; never forces a close.
    async fn disconnect(&self);

    /// Close the client. Idempotent; releases client-owned resources only,
    /// never process-wide shared ones.
    async fn close(&self);

    /// Send an opaque payload on the current channel.
    ///
    /// # Errors
    ///
    /// Fails with [`RemotingError::NotConnected`] when no live connection is
    /// published.
    async fn send(&self, payload: Bytes, wait_sent: bool) -> Result<()> {
        match self.channel() {
            Some(channel) => channel.send(payload, wait_sent).await,
            None => Err(RemotingError::NotConnected {
                addr: self.remote_addr(),
            }),
        }
    }
}
