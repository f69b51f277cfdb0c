//! TCP transport for the hawser remoting client stack.
//!
//! Implements the [`hawser_remoting`] channel and client contracts over a
//! length-prefixed TCP stream: [`TcpClient`] supervises one connection per
//! remote address, [`TcpChannel`] wraps each established connection, and the
//! process-wide [`ChannelRegistry`] keeps the wrapper-per-connection mapping
//! unique.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod client;
pub mod codec;
pub mod connection;
pub mod registry;

// Re-export commonly used types
pub use channel::TcpChannel;
pub use client::TcpClient;
pub use codec::FrameCodec;
pub use registry::ChannelRegistry;
