//! Flat string encoding for the `Huddle` wire taxonomy.
//!
//! Wire format is a reserved prefix followed by colon-joined fields:
//!
//! ```text
//! __JOIN__:<name>
//! __ALIVE__:<name>
//! __EXIT__:<name>
//! __KICK__:<target>:<admin>
//! <anything else>            chat text, passed through verbatim
//! ```
//!
//! There is no escaping, framing, or version field. Decoding never fails:
//! unrecognized or malformed payloads become [`WireMessage::Chat`].

use crate::message::{ALIVE_PREFIX, DELIMITER, EXIT_PREFIX, JOIN_PREFIX, KICK_PREFIX, WireMessage};

/// Encodes a [`WireMessage`] into its wire string.
#[must_use]
pub fn encode(message: &WireMessage) -> String {
    match message {
        WireMessage::Join { name } => format!("{JOIN_PREFIX}{name}"),
        WireMessage::Alive { name } => format!("{ALIVE_PREFIX}{name}"),
        WireMessage::Exit { name } => format!("{EXIT_PREFIX}{name}"),
        WireMessage::Kick { target, admin } => {
            format!("{KICK_PREFIX}{target}{DELIMITER}{admin}")
        }
        WireMessage::Chat { text } => text.clone(),
    }
}

/// Decodes a wire string into a [`WireMessage`].
///
/// Prefixes are tried in the order JOIN, ALIVE, EXIT, KICK. For the
/// single-name messages the first colon-separated segment after the prefix
/// is the name. For KICK the last segment is the admin and everything
/// before it is the target, so a target containing `:` still parses.
#[must_use]
pub fn decode(payload: &str) -> WireMessage {
    let structured = if let Some(rest) = payload.strip_prefix(JOIN_PREFIX) {
        first_field(rest).map(|name| WireMessage::Join { name })
    } else if let Some(rest) = payload.strip_prefix(ALIVE_PREFIX) {
        first_field(rest).map(|name| WireMessage::Alive { name })
    } else if let Some(rest) = payload.strip_prefix(EXIT_PREFIX) {
        first_field(rest).map(|name| WireMessage::Exit { name })
    } else if let Some(rest) = payload.strip_prefix(KICK_PREFIX) {
        kick_fields(rest)
    } else {
        None
    };

    structured.unwrap_or_else(|| WireMessage::Chat {
        text: payload.to_string(),
    })
}

/// Text of a raw transport payload; invalid UTF-8 sequences become U+FFFD.
#[must_use]
pub fn payload_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn first_field(rest: &str) -> Option<String> {
    let name = rest.split(DELIMITER).next().unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}

fn kick_fields(rest: &str) -> Option<WireMessage> {
    let (target, admin) = rest.rsplit_once(DELIMITER)?;
    if target.is_empty() || admin.is_empty() {
        return None;
    }
    Some(WireMessage::Kick {
        target: target.to_string(),
        admin: admin.to_string(),
    })
}
