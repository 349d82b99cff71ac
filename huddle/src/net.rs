//! Bridge between a UI shell and the async session.
//!
//! The shell sends [`ShellCommand`]s and drains [`ShellEvent`]s; everything
//! touching the network runs on background tokio tasks.
//!
//! ```text
//! shell  ←── ShellEvent ───  session tasks
//!        ─── ShellCommand →
//! ```
//!
//! Errors never cross the bridge as `Result`s: they arrive as
//! [`Notification::Error`](crate::membership::Notification::Error) events.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::membership::{Session, SessionConfig, SessionError, ShellEvent};
use crate::transport::Connector;

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Requests from the shell to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Connect and announce under `name`.
    Login {
        /// Display name as typed.
        name: String,
    },
    /// A line typed into the input box.
    Send {
        /// Raw text.
        text: String,
    },
    /// The user closed the window.
    Quit,
}

/// Spawn the session tasks and return the shell's channel handles.
///
/// The command handler lives until [`ShellCommand::Quit`] arrives or the
/// command sender is dropped; either way the session says goodbye.
#[must_use]
pub fn spawn_client<C>(
    connector: C,
    config: SessionConfig,
    command_capacity: usize,
) -> (mpsc::Sender<ShellCommand>, mpsc::Receiver<ShellEvent>)
where
    C: Connector + 'static,
{
    let (session, event_rx) = Session::<C::Transport>::new(config);
    let session = Arc::new(session);
    let (cmd_tx, cmd_rx) = mpsc::channel(command_capacity.max(1));

    tokio::spawn(async move {
        command_handler(connector, session, cmd_rx).await;
    });

    (cmd_tx, event_rx)
}

/// Background task: apply shell commands to the session.
async fn command_handler<C>(
    connector: C,
    session: Arc<Session<C::Transport>>,
    mut cmd_rx: mpsc::Receiver<ShellCommand>,
) where
    C: Connector + 'static,
{
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            ShellCommand::Login { name } => {
                let result = session.login(&name, &connector).await;
                // Only these outcomes move the session into Connected; a lost
                // JOIN still leaves it connected.
                if matches!(result, Ok(()) | Err(SessionError::Publish(_))) {
                    if let Some(name) = session.local_name() {
                        session
                            .emit(ShellEvent::LoggedIn {
                                name: name.to_string(),
                            })
                            .await;
                    }
                    let inbound = Arc::clone(&session);
                    tokio::spawn(async move {
                        inbound.run_inbound().await;
                    });
                }
                if let Err(e) = result {
                    tracing::warn!(error = %e, "login failed");
                    session.report(&e).await;
                }
            }
            ShellCommand::Send { text } => {
                if let Err(e) = session.send(&text).await {
                    tracing::debug!(error = %e, "send failed");
                    session.report(&e).await;
                }
            }
            ShellCommand::Quit => {
                tracing::info!("shell requested quit");
                break;
            }
        }
    }
    session.quit().await;
}
