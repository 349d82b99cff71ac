//! Notifications raised for the UI shell.
//!
//! Each variant renders to a line of text with simple inline markup
//! (`<b>`, `<i>`, inline color) that the shell is free to display or strip.

use std::fmt;

/// Something the shell should show to the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A peer announced itself.
    Joined {
        /// Name from the JOIN.
        name: String,
    },
    /// A peer announced it is leaving.
    Left {
        /// Name from the EXIT.
        name: String,
    },
    /// A kick was observed. Shown to every peer, not just the target.
    Kicked {
        /// Peer asked to leave.
        target: String,
        /// Claimed requester.
        admin: String,
    },
    /// A chat line, already rendered by its sender.
    Chat {
        /// Raw text as received.
        text: String,
    },
    /// Local answer to `list players`.
    Roster {
        /// Names to show, in ledger order.
        names: Vec<String>,
    },
    /// A local, non-fatal error.
    Error {
        /// Human-readable description.
        message: String,
    },
}

impl Notification {
    /// Render the notification as marked-up text.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Joined { name } => format!("<i>\u{1f4e2} {name} joined the chat</i>"),
            Self::Left { name } => format!("<i>\u{274c} {name} left the chat</i>"),
            Self::Kicked { target, admin } => format!(
                "<b style='color:red;'>\u{26a1} {target} was kicked by {admin}</b>"
            ),
            Self::Chat { text } => text.clone(),
            Self::Roster { names } => {
                format!("<br><b>[SYSTEM]: Online: {}</b>", names.join(", "))
            }
            Self::Error { message } => format!("<i>{message}</i>"),
        }
    }

    /// Build an error notification from any displayable error.
    #[must_use]
    pub fn error(err: &impl fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
