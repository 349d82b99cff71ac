//! Transport layer abstraction for `Huddle`.
//!
//! The membership core sees the network as one broadcast channel: every
//! payload published on a topic reaches every peer subscribed to it, the
//! publisher included, at most once per delivery and with no ordering across
//! publishers. Concrete implementations:
//! - [`loopback::LoopbackBus`]: in-process bus for tests
//! - [`broker::BrokerTransport`]: WebSocket client of `huddle-broker`

pub mod broker;
pub mod loopback;

use std::fmt;
use std::future::Future;

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// WebSocket connection to a `huddle-broker`.
    Broker,
    /// In-process loopback for testing.
    Loopback,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker => write!(f, "Broker"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the broker has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The broker endpoint could not be reached.
    #[error("{0} is unreachable")]
    Unreachable(String),

    /// The broker refused the subscription or sent something unexpected.
    #[error("broker rejected the request: {0}")]
    Rejected(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A connected, subscribed broadcast channel.
///
/// Publishing is fire-and-forget: `Ok(())` means the payload was handed to
/// the underlying channel, not that any peer received it.
pub trait BroadcastTransport: Send + Sync {
    /// Broadcast `payload` to every subscriber of `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next payload delivered on the subscribed topic.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the transport has
    /// been disconnected and no buffered deliveries remain.
    fn recv(&self) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Close the connection. Further publishes fail; calling twice is harmless.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    /// Whether the connection is still believed to be open.
    fn is_connected(&self) -> bool;

    /// Return the type of this transport.
    fn transport_type(&self) -> TransportType;
}

/// Opens a [`BroadcastTransport`] already subscribed to a topic.
///
/// This is the `connect` + `subscribe` half of the transport contract.
/// Callers bound it with their own connect timeout.
pub trait Connector: Send + Sync {
    /// The transport produced by a successful connect.
    type Transport: BroadcastTransport + 'static;

    /// Connect to the channel and subscribe to `topic`.
    fn connect(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
