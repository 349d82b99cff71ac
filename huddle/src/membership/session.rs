//! Async driver that runs a [`Membership`] over a [`BroadcastTransport`].
//!
//! The state machine sits behind a `parking_lot` mutex that is only held for
//! the synchronous transition; publishing and event delivery happen after
//! the guard is released. Inbound processing and user commands may run on
//! different tasks.
//!
//! Every publish goes through an async outbound gate. A publish re-checks
//! the state while holding the gate, and the farewell EXIT and transport
//! shutdown hold it too, so nothing reaches the wire after the farewell.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use huddle_proto::codec;
use huddle_proto::message::{NameError, PeerName, WireMessage};

use crate::transport::{BroadcastTransport, Connector, TransportError};

use super::commands::CommandError;
use super::{Membership, Notification, Outgoing, SessionState};

/// Topic every peer joins unless configured otherwise.
pub const DEFAULT_TOPIC: &str = "huddle/global_chat";

/// Default bound on connect plus subscribe.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the shell event channel.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Errors surfaced to the local user.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Connecting or subscribing failed.
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// Connect plus subscribe did not finish in time.
    #[error("Connection error: timed out after {0:?}")]
    Timeout(Duration),

    /// The chosen display name is unusable.
    #[error("Invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// A typed command was incomplete.
    #[error(transparent)]
    MalformedInput(#[from] CommandError),

    /// A broadcast could not be handed to the transport.
    #[error("Message not sent: {0}")]
    Publish(TransportError),

    /// `login` was called on a connected session.
    #[error("already logged in")]
    AlreadyLoggedIn,

    /// The session has not logged in yet.
    #[error("not connected")]
    NotConnected,

    /// The session quit or was kicked.
    #[error("session has ended")]
    Terminated,
}

/// Events delivered to the UI shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// Show a notification.
    Notify(Notification),
    /// Login connected the session under `name`. Sent by the shell bridge
    /// even when the JOIN announcement itself was lost.
    LoggedIn {
        /// Canonical (trimmed) display name.
        name: String,
    },
    /// The local peer was kicked; the shell should close its window.
    ForceClose,
}

/// Settings for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Topic shared by every peer of the group.
    pub topic: String,
    /// Upper bound on connect plus subscribe during login.
    pub connect_timeout: Duration,
    /// Capacity of the [`ShellEvent`] channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// One local peer: a [`Membership`] bound to a transport and a shell.
pub struct Session<T: BroadcastTransport> {
    membership: Mutex<Membership>,
    transport: Mutex<Option<Arc<T>>>,
    outbound: tokio::sync::Mutex<()>,
    pumping: AtomicBool,
    config: SessionConfig,
    event_tx: mpsc::Sender<ShellEvent>,
}

impl<T: BroadcastTransport + 'static> Session<T> {
    /// Create an unauthenticated session.
    ///
    /// Returns the session and the receiver the shell should drain.
    #[must_use]
    pub fn new(config: SessionConfig) -> (Self, mpsc::Receiver<ShellEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let session = Self {
            membership: Mutex::new(Membership::new()),
            transport: Mutex::new(None),
            outbound: tokio::sync::Mutex::new(()),
            pumping: AtomicBool::new(false),
            config,
            event_tx,
        };
        (session, event_rx)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.membership.lock().state()
    }

    /// Name chosen at login.
    #[must_use]
    pub fn local_name(&self) -> Option<PeerName> {
        self.membership.lock().local_name().cloned()
    }

    /// Snapshot of the presence ledger in insertion order.
    #[must_use]
    pub fn online(&self) -> Vec<String> {
        self.membership.lock().ledger().names()
    }

    /// Topic this session publishes on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Log in as `raw_name`: connect, subscribe, then announce with JOIN.
    ///
    /// Nothing changes if validation or connecting fails, so the caller may
    /// retry with another name.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidName`], [`SessionError::Connection`],
    /// [`SessionError::Timeout`], or a lifecycle error when not
    /// unauthenticated. [`SessionError::Publish`] means the session is
    /// connected but the JOIN was lost.
    pub async fn login<C>(&self, raw_name: &str, connector: &C) -> Result<(), SessionError>
    where
        C: Connector<Transport = T>,
    {
        let name = PeerName::parse(raw_name)?;
        match self.state() {
            SessionState::Unauthenticated => {}
            SessionState::Connected => return Err(SessionError::AlreadyLoggedIn),
            SessionState::Terminated => return Err(SessionError::Terminated),
        }

        let timeout = self.config.connect_timeout;
        let transport = match tokio::time::timeout(timeout, connector.connect(&self.config.topic))
            .await
        {
            Ok(Ok(transport)) => Arc::new(transport),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, topic = %self.config.topic, "connect failed");
                return Err(SessionError::Connection(e));
            }
            Err(_) => {
                tracing::warn!(?timeout, topic = %self.config.topic, "connect timed out");
                return Err(SessionError::Timeout(timeout));
            }
        };

        let login = self.membership.lock().login(name.clone());
        let join = match login {
            Ok(join) => join,
            Err(e) => {
                transport.disconnect().await;
                return Err(e);
            }
        };
        *self.transport.lock() = Some(Arc::clone(&transport));

        tracing::info!(
            name = %name,
            topic = %self.config.topic,
            transport = %transport.transport_type(),
            "logged in"
        );
        self.publish(&join).await
    }

    /// Pump inbound payloads until the session ends or the transport closes.
    ///
    /// Losing the transport while still connected is reported as an error
    /// notification. Only one pump runs per session; extra calls return at
    /// once.
    pub async fn run_inbound(&self) {
        let Some(transport) = self.current_transport() else {
            return;
        };
        if self.pumping.swap(true, Ordering::AcqRel) {
            tracing::debug!("inbound pump already running");
            return;
        }
        loop {
            match transport.recv().await {
                Ok(payload) => {
                    if !self.deliver(&payload).await {
                        break;
                    }
                }
                Err(e) => {
                    if self.state() == SessionState::Connected {
                        tracing::warn!(error = %e, "inbound stream ended");
                        self.report(&SessionError::Connection(e)).await;
                    } else {
                        tracing::debug!(error = %e, "inbound stream closed");
                    }
                    break;
                }
            }
        }
    }

    /// Apply one raw inbound payload.
    ///
    /// Returns `false` once the session no longer accepts traffic.
    pub async fn deliver(&self, payload: &str) -> bool {
        let message = codec::decode(payload);
        let kind = message.kind();
        let control = message.is_control();
        let reaction = {
            let mut membership = self.membership.lock();
            if membership.state() != SessionState::Connected {
                tracing::trace!(kind, "dropping inbound outside connected state");
                return false;
            }
            membership.on_inbound(message)
        };
        tracing::debug!(kind, control, "inbound");

        for notification in reaction.notifications {
            self.notify(notification).await;
        }
        if reaction.terminate {
            tracing::info!("kicked, closing session");
            self.shutdown_transport(reaction.reply).await;
            self.emit(ShellEvent::ForceClose).await;
            return false;
        }
        if let Some(reply) = reaction.reply
            && let Err(e) = self.publish(&reply).await
        {
            tracing::warn!(error = %e, kind = reply.kind(), "reply not sent");
        }
        true
    }

    /// Handle a line the user typed.
    ///
    /// # Errors
    ///
    /// [`SessionError::MalformedInput`] for `kick` without a name,
    /// [`SessionError::Publish`] when the broadcast fails, or a lifecycle
    /// error outside `Connected`.
    pub async fn send(&self, text: &str) -> Result<(), SessionError> {
        let outgoing = self.membership.lock().outgoing(text)?;
        match outgoing {
            Outgoing::Ignore => Ok(()),
            Outgoing::Local(notification) => {
                self.notify(notification).await;
                Ok(())
            }
            Outgoing::Publish(message) => self.publish(&message).await,
        }
    }

    /// Ask every peer named `target` to leave.
    ///
    /// # Errors
    ///
    /// Same as [`Session::send`].
    pub async fn kick(&self, target: &str) -> Result<(), SessionError> {
        let request = self.membership.lock().kick(target)?;
        self.publish(&request).await
    }

    /// Say goodbye and close the transport. Safe to call more than once.
    pub async fn quit(&self) {
        let farewell = self.membership.lock().quit();
        self.shutdown_transport(farewell).await;
    }

    /// Forward an error to the shell as a notification.
    pub async fn report(&self, err: &SessionError) {
        self.notify(Notification::error(err)).await;
    }

    /// Publish while still connected. The state is checked under the gate.
    async fn publish(&self, message: &WireMessage) -> Result<(), SessionError> {
        let _gate = self.outbound.lock().await;
        self.ensure_connected()?;
        let transport = self.current_transport().ok_or(SessionError::NotConnected)?;
        self.publish_on(&transport, message)
            .await
            .map_err(SessionError::Publish)
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.membership.lock().state() {
            SessionState::Connected => Ok(()),
            SessionState::Unauthenticated => Err(SessionError::NotConnected),
            SessionState::Terminated => Err(SessionError::Terminated),
        }
    }

    async fn publish_on(&self, transport: &T, message: &WireMessage) -> Result<(), TransportError> {
        let payload = codec::encode(message);
        tracing::debug!(kind = message.kind(), bytes = payload.len(), "publish");
        transport.publish(&self.config.topic, &payload).await
    }

    /// Send the optional farewell, then drop the transport.
    async fn shutdown_transport(&self, farewell: Option<WireMessage>) {
        let _gate = self.outbound.lock().await;
        let transport = self.transport.lock().take();
        let Some(transport) = transport else {
            return;
        };
        if let Some(exit) = farewell
            && let Err(e) = self.publish_on(&transport, &exit).await
        {
            tracing::warn!(error = %e, "farewell not sent");
        }
        transport.disconnect().await;
    }

    fn current_transport(&self) -> Option<Arc<T>> {
        self.transport.lock().clone()
    }

    async fn notify(&self, notification: Notification) {
        self.emit(ShellEvent::Notify(notification)).await;
    }

    pub(crate) async fn emit(&self, event: ShellEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("shell event receiver dropped");
        }
    }
}
