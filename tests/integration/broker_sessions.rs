//! Integration tests running full sessions against a real `huddle-broker`.
//!
//! Each test starts a broker on an ephemeral port and connects clients over
//! WebSocket with [`BrokerConnector`].
//!
//! Verification command: `cargo test --test broker_sessions`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use huddle::membership::{
    Notification, Session, SessionConfig, SessionError, SessionState, ShellEvent,
};
use huddle::net::{ShellCommand, spawn_client};
use huddle::transport::broker::{BrokerConnector, BrokerTransport};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TOPIC: &str = "huddle/global_chat";

/// Start a broker on an OS-assigned port and return its WebSocket URL.
async fn start_broker() -> String {
    let (addr, _handle) = huddle_broker::broker::start_server("127.0.0.1:0")
        .await
        .expect("start broker");
    format!("ws://{addr}/ws")
}

fn connector(url: &str) -> BrokerConnector {
    BrokerConnector::new(url, Duration::from_secs(60), Duration::from_secs(5))
}

fn config() -> SessionConfig {
    SessionConfig {
        topic: TOPIC.to_string(),
        connect_timeout: Duration::from_secs(5),
        event_buffer: 128,
    }
}

struct Peer {
    session: Arc<Session<BrokerTransport>>,
    events: mpsc::Receiver<ShellEvent>,
}

async fn join(url: &str, name: &str) -> Peer {
    let (session, events) = Session::new(config());
    session.login(name, &connector(url)).await.expect("login");
    let session = Arc::new(session);
    let inbound = Arc::clone(&session);
    tokio::spawn(async move {
        inbound.run_inbound().await;
    });
    Peer { session, events }
}

async fn wait_for_online(peer: &Peer, expected: &[&str]) {
    let mut want: Vec<String> = expected.iter().map(ToString::to_string).collect();
    want.sort();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut names = peer.session.online();
            names.sort();
            if names == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "ledger never became {want:?}");
}

async fn next_matching(
    events: &mut mpsc::Receiver<ShellEvent>,
    pred: impl Fn(&ShellEvent) -> bool,
) -> ShellEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn peers_converge_through_the_broker() {
    let url = start_broker().await;
    let alice = join(&url, "Alice").await;
    wait_for_online(&alice, &["Alice"]).await;

    let bob = join(&url, "Bob").await;
    let carol = join(&url, "Carol").await;

    for peer in [&alice, &bob, &carol] {
        wait_for_online(peer, &["Alice", "Bob", "Carol"]).await;
    }
}

#[tokio::test]
async fn chat_and_exit_flow_through_the_broker() {
    let url = start_broker().await;
    let mut alice = join(&url, "Alice").await;
    let bob = join(&url, "Bob").await;
    wait_for_online(&alice, &["Alice", "Bob"]).await;

    bob.session.send("hi Alice").await.expect("send");
    let chat = next_matching(&mut alice.events, |e| {
        matches!(e, ShellEvent::Notify(Notification::Chat { .. }))
    })
    .await;
    assert_eq!(
        chat,
        ShellEvent::Notify(Notification::Chat {
            text: "<b>Bob</b>: hi Alice".into()
        })
    );

    bob.session.quit().await;
    wait_for_online(&alice, &["Alice"]).await;
}

#[tokio::test]
async fn kick_through_the_broker_closes_target() {
    let url = start_broker().await;
    let alice = join(&url, "Alice").await;
    let mut bob = join(&url, "Bob").await;
    wait_for_online(&alice, &["Alice", "Bob"]).await;
    wait_for_online(&bob, &["Alice", "Bob"]).await;

    alice.session.send("kick Bob").await.expect("kick");

    next_matching(&mut bob.events, |e| *e == ShellEvent::ForceClose).await;
    assert_eq!(bob.session.state(), SessionState::Terminated);
    wait_for_online(&alice, &["Alice"]).await;
}

#[tokio::test]
async fn unreachable_broker_is_a_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let (session, _events) = Session::<BrokerTransport>::new(config());
    let err = session
        .login("Alice", &connector(&format!("ws://{addr}/ws")))
        .await
        .unwrap_err();

    assert!(
        matches!(err, SessionError::Connection(_) | SessionError::Timeout(_)),
        "{err:?}"
    );
    assert!(err.to_string().starts_with("Connection error:"));
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn shell_bridge_over_the_broker() {
    let url = start_broker().await;
    let (commands, mut events) = spawn_client(connector(&url), config(), 8);

    commands
        .send(ShellCommand::Login {
            name: "Alice".into(),
        })
        .await
        .expect("login");
    next_matching(&mut events, |e| {
        matches!(e, ShellEvent::Notify(Notification::Joined { name }) if name == "Alice")
    })
    .await;

    commands
        .send(ShellCommand::Send {
            text: "list players".into(),
        })
        .await
        .expect("send");
    let roster = next_matching(&mut events, |e| {
        matches!(e, ShellEvent::Notify(Notification::Roster { .. }))
    })
    .await;
    assert_eq!(
        roster,
        ShellEvent::Notify(Notification::Roster {
            names: vec!["Alice".into()]
        })
    );

    commands.send(ShellCommand::Quit).await.expect("quit");
}
