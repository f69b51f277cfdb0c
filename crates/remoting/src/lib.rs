//! Client-side remoting transport core.
//!
//! This crate is the transport-agnostic half of a remoting client stack: it
//! defines the logical channel model, the connection-supervisor contract,
//! the exchange client facade, and a shared heartbeat monitor that keeps
//! long-lived connections alive and detects silent peer death.
//!
//! Transport implementations (TCP in `hawser-remoting-tcp`) plug in at the
//! [`Channel`]/[`TransportClient`] seam; request/response correlation plugs
//! in at the [`ExchangeChannel`] seam.
//!
//! # Example
//!
//! ```no_run
//! use hawser_remoting::{ExchangeClient, HeartbeatConfig};
//! use std::time::Duration;
//!
//! # async fn example(
//! #     client: std::sync::Arc<dyn hawser_remoting::TransportClient>,
//! #     exchange: std::sync::Arc<dyn hawser_remoting::ExchangeChannel>,
//! # ) -> hawser_remoting::Result<()> {
//! let facade = ExchangeClient::new(
//!     client,
//!     exchange,
//!     HeartbeatConfig::for_interval(Duration::from_secs(60)),
//! )?;
//!
//! facade.connect().await?;
//! let pending = facade.request(bytes::Bytes::from_static(b"ping")).await?;
//! let response = pending.wait().await?;
//! # let _ = response;
//! facade.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod heartbeat;

// Re-export commonly used types
pub use channel::{Attributes, Channel, ChannelHandler};
pub use client::TransportClient;
pub use config::{ConnectConfig, HeartbeatConfig};
pub use error::{ConfigError, ConnectError, RemotingError, Result};
pub use exchange::{ExchangeChannel, ExchangeClient, PendingResponse};
pub use heartbeat::{ChannelProvider, HeartbeatEndpoint, HeartbeatMonitor, HeartbeatTask};

// Re-export dependencies that are part of our public API
pub use bytes::Bytes;
