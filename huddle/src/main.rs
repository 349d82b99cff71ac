//! `huddle` -- line-based chat shell with decentralized presence.
//!
//! Connects to a `huddle-broker`, announces itself on the shared topic, and
//! prints what the group says. Type `list players` to see who is online,
//! `kick <name>` to ask someone to leave, and `/quit` (or EOF) to exit.
//!
//! ```bash
//! cargo run --bin huddle -- --name Alice
//!
//! # Or via environment variables
//! HUDDLE_BROKER_URL=ws://127.0.0.1:9000/ws HUDDLE_NAME=Bob cargo run --bin huddle
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use huddle::config::{CliArgs, ClientConfig};
use huddle::membership::{Notification, ShellEvent};
use huddle::net::{self, ShellCommand};
use huddle::shell;

/// Shown until a login succeeds.
const NAME_PROMPT: &str = "Enter your name:";

/// Line that closes the shell.
const QUIT_COMMAND: &str = "/quit";

/// How long to keep printing events after quitting.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file; stdout belongs to the chat.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(broker = %config.broker_url, topic = %config.topic, "huddle starting");

    let (cmd_tx, evt_rx) = net::spawn_client(
        config.broker_connector(),
        config.to_session_config(),
        config.channel_capacity,
    );

    let result = run_shell(&config, &cmd_tx, evt_rx).await;

    tracing::info!("huddle exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("I/O error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to flush
/// buffered entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("huddle.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Where the shell is in the login exchange.
#[derive(Debug, PartialEq, Eq)]
enum Phase {
    /// Waiting for the user to type a name.
    NeedName,
    /// Login sent; waiting for the session to connect.
    Pending,
    /// Logged in; lines are chat.
    Ready,
}

/// Read stdin lines and print session events until quit, EOF, or a kick.
async fn run_shell(
    config: &ClientConfig,
    cmd_tx: &mpsc::Sender<ShellCommand>,
    mut evt_rx: mpsc::Receiver<ShellEvent>,
) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut phase = if let Some(name) = &config.name {
        submit_login(cmd_tx, name).await
    } else {
        write_line(&mut stdout, NAME_PROMPT).await?;
        Phase::NeedName
    };

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim() == QUIT_COMMAND {
                    break;
                }
                match &phase {
                    Phase::Ready => {
                        if cmd_tx.send(ShellCommand::Send { text: line }).await.is_err() {
                            break;
                        }
                    }
                    Phase::NeedName if !line.trim().is_empty() => {
                        phase = submit_login(cmd_tx, &line).await;
                    }
                    Phase::NeedName | Phase::Pending => {}
                }
            }
            event = evt_rx.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                if event == ShellEvent::ForceClose {
                    write_line(&mut stdout, "You were removed from the chat.").await?;
                    return Ok(());
                }
                if let Some(text) = shell::describe(&event) {
                    write_line(&mut stdout, &text).await?;
                }
                let was_pending = phase == Phase::Pending;
                phase = advance(phase, &event);
                if was_pending && phase == Phase::NeedName {
                    write_line(&mut stdout, NAME_PROMPT).await?;
                }
            }
        }
    }

    if cmd_tx.send(ShellCommand::Quit).await.is_err() {
        return Ok(());
    }
    drain_events(&mut stdout, &mut evt_rx).await
}

/// Login phase after `event`. Only a pending login reacts: it is done once
/// the session reports it connected, and any error before that means the
/// user has to pick a name again.
fn advance(phase: Phase, event: &ShellEvent) -> Phase {
    match (phase, event) {
        (Phase::Pending, ShellEvent::LoggedIn { .. }) => Phase::Ready,
        (Phase::Pending, ShellEvent::Notify(Notification::Error { .. })) => Phase::NeedName,
        (phase, _) => phase,
    }
}

async fn submit_login(cmd_tx: &mpsc::Sender<ShellCommand>, name: &str) -> Phase {
    let login = ShellCommand::Login {
        name: name.trim().to_string(),
    };
    if cmd_tx.send(login).await.is_err() {
        tracing::warn!("session task is gone");
    }
    Phase::Pending
}

/// Print whatever is still queued, up to [`DRAIN_TIMEOUT`].
async fn drain_events(
    stdout: &mut tokio::io::Stdout,
    evt_rx: &mut mpsc::Receiver<ShellEvent>,
) -> std::io::Result<()> {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, evt_rx.recv()).await {
        if let Some(text) = shell::describe(&event) {
            write_line(stdout, &text).await?;
        }
    }
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, text: &str) -> std::io::Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
