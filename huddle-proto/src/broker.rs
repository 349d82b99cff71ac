//! Frame format spoken between `Huddle` clients and the pub/sub broker.
//!
//! Frames are postcard-encoded [`BrokerFrame`] values carried in WebSocket
//! binary messages. The broker only reads the topic; payloads are raw bytes
//! (normally the UTF-8 strings produced by [`crate::codec`]) and are
//! forwarded untouched.

use serde::{Deserialize, Serialize};

/// Error type for broker frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Serialization or deserialization failed.
    #[error("broker frame error: {0}")]
    Serialization(String),
}

/// Messages exchanged between clients and the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerFrame {
    /// Client asks to receive every publish on `topic`.
    Subscribe {
        /// Topic to join.
        topic: String,
    },

    /// Broker confirms a subscription.
    Subscribed {
        /// Topic that was joined (echoed back).
        topic: String,
    },

    /// Client stops receiving publishes on `topic`.
    Unsubscribe {
        /// Topic to leave.
        topic: String,
    },

    /// Client broadcasts a payload to every subscriber of `topic`.
    Publish {
        /// Destination topic.
        topic: String,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },

    /// Broker hands a published payload to a subscriber.
    ///
    /// The publisher receives its own publishes too if it is subscribed.
    Deliver {
        /// Topic the payload was published on.
        topic: String,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },

    /// Broker reports an error condition.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a [`BrokerFrame`] into bytes.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if the frame cannot be serialized.
pub fn encode(frame: &BrokerFrame) -> Result<Vec<u8>, FrameError> {
    postcard::to_allocvec(frame).map_err(|e| FrameError::Serialization(e.to_string()))
}

/// Decodes a [`BrokerFrame`] from bytes.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if the bytes are not a valid frame.
pub fn decode(bytes: &[u8]) -> Result<BrokerFrame, FrameError> {
    postcard::from_bytes(bytes).map_err(|e| FrameError::Serialization(e.to_string()))
}
