//! The kick handshake.
//!
//! A kick is fire-and-forget: the requester publishes it once, nobody
//! acknowledges it, and nothing checks who sent it. Every peer shows the
//! same notice; the peer whose name matches the target ends its own
//! session. The kicked user can log in again immediately.

use huddle_proto::message::{PeerName, WireMessage};

use super::notify::Notification;

/// Build the request the local peer publishes to kick `target`.
#[must_use]
pub fn kick_request(target: &str, admin: &PeerName) -> WireMessage {
    WireMessage::Kick {
        target: target.to_string(),
        admin: admin.as_str().to_string(),
    }
}

/// How an observed kick affects the local peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickVerdict {
    /// Notice shown to the local user.
    pub notification: Notification,
    /// Whether the local session must terminate.
    pub terminates_local: bool,
}

/// Evaluate a kick for the peer named `local`.
///
/// The `admin` field is taken at face value; any peer may claim any name.
#[must_use]
pub fn assess(target: &str, admin: &str, local: &PeerName) -> KickVerdict {
    KickVerdict {
        notification: Notification::Kicked {
            target: target.to_string(),
            admin: admin.to_string(),
        },
        terminates_local: local == target,
    }
}
