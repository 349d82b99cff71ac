//! Presence and membership engine.
//!
//! [`Membership`] is the per-peer state machine. It performs no I/O: each
//! inbound message yields a [`Reaction`] (notifications to raise, at most one
//! broadcast to send, whether the session ends), and [`session::Session`]
//! applies reactions against a real transport.
//!
//! ```text
//! Unauthenticated --login--> Connected --quit / kicked--> Terminated
//! ```
//!
//! Convergence is flooding anti-entropy: every peer answers a JOIN from
//! someone else with its own ALIVE, so a newcomer learns the full membership
//! after one round trip per existing peer. N peers joining together cost
//! O(N²) ALIVE messages.

pub mod commands;
pub mod ledger;
pub mod moderation;
pub mod notify;
pub mod session;

use std::fmt;

use huddle_proto::message::{PeerName, WireMessage};

pub use ledger::PresenceLedger;
pub use notify::Notification;
pub use session::{Session, SessionConfig, SessionError, ShellEvent};

use commands::LocalCommand;

/// Lifecycle of a local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No name chosen, no transport.
    Unauthenticated,
    /// Logged in and subscribed to the topic.
    Connected,
    /// Quit or kicked. No further traffic is sent or processed.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Connected => write!(f, "connected"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Effects of one inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Notices for the shell, in order.
    pub notifications: Vec<Notification>,
    /// Broadcast to publish in response.
    pub reply: Option<WireMessage>,
    /// The local session was kicked and has terminated.
    pub terminate: bool,
}

/// What to do with a line the local user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Nothing to do (blank input).
    Ignore,
    /// Show something locally; never published.
    Local(Notification),
    /// Broadcast on the topic.
    Publish(WireMessage),
}

/// Per-peer membership state machine.
#[derive(Debug, Clone)]
pub struct Membership {
    local: Option<PeerName>,
    ledger: PresenceLedger,
    state: SessionState,
}

impl Default for Membership {
    fn default() -> Self {
        Self::new()
    }
}

impl Membership {
    /// A fresh, unauthenticated session with an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: None,
            ledger: PresenceLedger::new(),
            state: SessionState::Unauthenticated,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The name chosen at login, if any.
    #[must_use]
    pub const fn local_name(&self) -> Option<&PeerName> {
        self.local.as_ref()
    }

    /// Names currently believed online.
    #[must_use]
    pub const fn ledger(&self) -> &PresenceLedger {
        &self.ledger
    }

    /// Names shown by `list players`: the ledger, or just the local name
    /// while the ledger is still empty.
    #[must_use]
    pub fn roster(&self) -> Vec<String> {
        if self.ledger.is_empty() {
            return self
                .local
                .iter()
                .map(|name| name.as_str().to_string())
                .collect();
        }
        self.ledger.names()
    }

    /// Enter `Connected` as `name`, returning the JOIN to broadcast.
    ///
    /// The transport must already be connected and subscribed.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyLoggedIn`] when connected,
    /// [`SessionError::Terminated`] when the session has ended.
    pub fn login(&mut self, name: PeerName) -> Result<WireMessage, SessionError> {
        match self.state {
            SessionState::Unauthenticated => {}
            SessionState::Connected => return Err(SessionError::AlreadyLoggedIn),
            SessionState::Terminated => return Err(SessionError::Terminated),
        }
        let join = WireMessage::Join {
            name: name.as_str().to_string(),
        };
        self.local = Some(name);
        self.state = SessionState::Connected;
        Ok(join)
    }

    /// Apply one decoded inbound message.
    ///
    /// Outside `Connected` every message is dropped.
    pub fn on_inbound(&mut self, message: WireMessage) -> Reaction {
        let mut reaction = Reaction::default();
        if self.state != SessionState::Connected {
            return reaction;
        }
        let Some(local) = &self.local else {
            return reaction;
        };

        match message {
            WireMessage::Join { name } => {
                self.ledger.insert(&name);
                if *local != *name {
                    reaction.reply = Some(WireMessage::Alive {
                        name: local.as_str().to_string(),
                    });
                }
                reaction.notifications.push(Notification::Joined { name });
            }
            WireMessage::Alive { name } => {
                self.ledger.insert(&name);
            }
            WireMessage::Exit { name } => {
                self.ledger.remove(&name);
                reaction.notifications.push(Notification::Left { name });
            }
            WireMessage::Kick { target, admin } => {
                let verdict = moderation::assess(&target, &admin, local);
                reaction.notifications.push(verdict.notification);
                if verdict.terminates_local {
                    reaction.reply = Some(WireMessage::Exit {
                        name: local.as_str().to_string(),
                    });
                    reaction.terminate = true;
                    self.state = SessionState::Terminated;
                }
            }
            WireMessage::Chat { text } => {
                reaction.notifications.push(Notification::Chat { text });
            }
        }
        reaction
    }

    /// Leave the session, returning the EXIT to broadcast if one is due.
    ///
    /// Only a connected session says goodbye; quitting twice is a no-op.
    pub fn quit(&mut self) -> Option<WireMessage> {
        let was_connected = self.state == SessionState::Connected;
        self.state = SessionState::Terminated;
        if !was_connected {
            return None;
        }
        self.local.as_ref().map(|name| WireMessage::Exit {
            name: name.as_str().to_string(),
        })
    }

    /// Decide what a line of user input does.
    ///
    /// # Errors
    ///
    /// [`SessionError::MalformedInput`] for `kick` without a target,
    /// [`SessionError::NotConnected`] before login, and
    /// [`SessionError::Terminated`] after the session has ended.
    pub fn outgoing(&self, input: &str) -> Result<Outgoing, SessionError> {
        let local = self.connected_name()?;
        let outgoing = match commands::parse(input)? {
            None => Outgoing::Ignore,
            Some(LocalCommand::ListPlayers) => Outgoing::Local(Notification::Roster {
                names: self.roster(),
            }),
            Some(LocalCommand::Kick { target }) => {
                Outgoing::Publish(moderation::kick_request(target, local))
            }
            Some(LocalCommand::Say { text }) => Outgoing::Publish(WireMessage::Chat {
                text: format!("<b>{local}</b>: {text}"),
            }),
        };
        Ok(outgoing)
    }

    /// Build a kick request for `target` from the local peer.
    ///
    /// # Errors
    ///
    /// [`SessionError::MalformedInput`] for a blank target, and the same
    /// state errors as [`Membership::outgoing`].
    pub fn kick(&self, target: &str) -> Result<WireMessage, SessionError> {
        let local = self.connected_name()?;
        let target = target.trim();
        if target.is_empty() {
            return Err(commands::CommandError::MissingKickTarget.into());
        }
        Ok(moderation::kick_request(target, local))
    }

    fn connected_name(&self) -> Result<&PeerName, SessionError> {
        match (self.state, &self.local) {
            (SessionState::Connected, Some(name)) => Ok(name),
            (SessionState::Terminated, _) => Err(SessionError::Terminated),
            _ => Err(SessionError::NotConnected),
        }
    }
}
