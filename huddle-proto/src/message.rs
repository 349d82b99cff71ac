//! Message taxonomy and peer naming for the `Huddle` presence protocol.
//!
//! Every payload on the shared topic is a flat UTF-8 string. Four reserved
//! prefixes mark the presence and moderation messages; anything else is a
//! chat line. See [`crate::codec`] for the encoding rules.

use std::fmt;

/// Field delimiter used between the prefix and each field.
pub const DELIMITER: char = ':';

/// Prefix announcing that a peer has come online.
pub const JOIN_PREFIX: &str = "__JOIN__:";

/// Prefix of the reply an existing peer sends when it sees a join.
pub const ALIVE_PREFIX: &str = "__ALIVE__:";

/// Prefix announcing that a peer is leaving.
pub const EXIT_PREFIX: &str = "__EXIT__:";

/// Prefix of a moderation request asking a peer to leave.
pub const KICK_PREFIX: &str = "__KICK__:";

/// A message carried on the shared topic.
///
/// Decoding is total: a payload that does not match one of the reserved
/// prefixes (or matches one but is malformed) is a [`WireMessage::Chat`]
/// carrying the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireMessage {
    /// A peer logged in and announces itself.
    Join {
        /// Display name of the joining peer.
        name: String,
    },
    /// An existing peer answers a join so the newcomer learns about it.
    Alive {
        /// Display name of the answering peer.
        name: String,
    },
    /// A peer is leaving the topic.
    Exit {
        /// Display name of the departing peer.
        name: String,
    },
    /// Advisory request that `target` leave the chat.
    Kick {
        /// Name of the peer being removed.
        target: String,
        /// Name the requester claims. Not authenticated.
        admin: String,
    },
    /// Free-form rendered text, passed through verbatim.
    Chat {
        /// The rendered text, possibly containing inline markup.
        text: String,
    },
}

impl WireMessage {
    /// Short tag used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Alive { .. } => "alive",
            Self::Exit { .. } => "exit",
            Self::Kick { .. } => "kick",
            Self::Chat { .. } => "chat",
        }
    }

    /// Returns `true` for the presence and moderation variants.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        !matches!(self, Self::Chat { .. })
    }
}

/// Reasons a display name is refused at login.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Name is empty after trimming whitespace.
    #[error("name must not be empty")]
    Empty,

    /// Name contains the field delimiter and would break field parsing.
    #[error("name must not contain '{DELIMITER}'")]
    ContainsDelimiter,
}

/// A peer's display name.
///
/// Names are unauthenticated and not unique; two peers may pick the same
/// one. A `PeerName` is guaranteed non-empty, trimmed, and free of the
/// `:` delimiter, so it always survives an encode/decode cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerName(String);

impl PeerName {
    /// Validates a raw name typed by the user.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::Empty`] if nothing remains after trimming, or
    /// [`NameError::ContainsDelimiter`] if the name contains `:`.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.contains(DELIMITER) {
            return Err(NameError::ContainsDelimiter);
        }
        Ok(Self(name.to_string()))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PeerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PeerName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
