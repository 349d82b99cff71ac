//! Integration tests for the shell command/event bridge.
//!
//! Drives sessions only through [`ShellCommand`]s and observes only
//! [`ShellEvent`]s, the way a UI shell would.
//!
//! Verification command: `cargo test --test shell_bridge`

use std::time::Duration;

use tokio::sync::mpsc;

use huddle::membership::{Notification, SessionConfig, ShellEvent};
use huddle::net::{ShellCommand, spawn_client};
use huddle::shell;
use huddle::transport::BroadcastTransport;
use huddle::transport::loopback::LoopbackBus;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TOPIC: &str = "huddle/global_chat";

struct Shell {
    commands: mpsc::Sender<ShellCommand>,
    events: mpsc::Receiver<ShellEvent>,
}

impl Shell {
    fn open(bus: &LoopbackBus) -> Self {
        let config = SessionConfig {
            topic: TOPIC.to_string(),
            connect_timeout: Duration::from_secs(1),
            event_buffer: 64,
        };
        let (commands, events) = spawn_client(bus.clone(), config, 16);
        Self { commands, events }
    }

    async fn login(&self, name: &str) {
        self.command(ShellCommand::Login { name: name.into() }).await;
    }

    async fn type_line(&self, text: &str) {
        self.command(ShellCommand::Send { text: text.into() }).await;
    }

    async fn command(&self, cmd: ShellCommand) {
        self.commands.send(cmd).await.expect("command channel closed");
    }

    /// Next notification matching `pred`, skipping everything else.
    async fn expect(&mut self, pred: impl Fn(&Notification) -> bool) -> Notification {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match self.events.recv().await {
                    Some(ShellEvent::Notify(n)) if pred(&n) => return n,
                    Some(_) => {}
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("notification did not arrive")
    }

    /// Log in and wait for our own JOIN to come back.
    async fn login_and_wait(&mut self, name: &str) {
        self.login(name).await;
        let me = name.to_string();
        self.expect(move |n| matches!(n, Notification::Joined { name } if *name == me))
            .await;
    }
}

fn is_error(n: &Notification) -> bool {
    matches!(n, Notification::Error { .. })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_reaches_every_shell_with_sender_markup() {
    let bus = LoopbackBus::new();
    let mut alice = Shell::open(&bus);
    let mut bob = Shell::open(&bus);
    alice.login_and_wait("Alice").await;
    bob.login_and_wait("Bob").await;

    alice.type_line("  hello everyone  ").await;

    for peer in [&mut alice, &mut bob] {
        let chat = peer
            .expect(|n| matches!(n, Notification::Chat { .. }))
            .await;
        assert_eq!(chat.render(), "<b>Alice</b>: hello everyone");
        assert_eq!(shell::to_plain(&chat.render()), "Alice: hello everyone");
    }
}

#[tokio::test]
async fn list_players_is_answered_locally() {
    let bus = LoopbackBus::new();
    let observer = bus.attach(TOPIC);
    let mut alice = Shell::open(&bus);
    let mut bob = Shell::open(&bus);
    alice.login_and_wait("Alice").await;
    bob.login_and_wait("Bob").await;
    alice
        .expect(|n| matches!(n, Notification::Joined { name } if name == "Bob"))
        .await;

    alice.type_line("LIST PLAYERS").await;

    let roster = alice
        .expect(|n| matches!(n, Notification::Roster { .. }))
        .await;
    assert_eq!(roster.render(), "<br><b>[SYSTEM]: Online: Alice, Bob</b>");

    // Nothing but presence traffic ever hit the topic.
    bus.inject(TOPIC, "sentinel");
    let mut seen = Vec::new();
    loop {
        let payload = observer.recv().await.expect("observer recv");
        if payload == "sentinel" {
            break;
        }
        seen.push(payload);
    }
    assert!(seen.iter().all(|p| p.starts_with("__")), "{seen:?}");
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let bus = LoopbackBus::new();
    let observer = bus.attach(TOPIC);
    let mut alice = Shell::open(&bus);
    alice.login_and_wait("Alice").await;
    assert_eq!(observer.recv().await.expect("join"), "__JOIN__:Alice");

    alice.type_line("   ").await;
    alice.type_line("after").await;

    assert_eq!(observer.recv().await.expect("chat"), "<b>Alice</b>: after");
}

#[tokio::test]
async fn bare_kick_shows_error_and_session_survives() {
    let bus = LoopbackBus::new();
    let mut alice = Shell::open(&bus);
    alice.login_and_wait("Alice").await;

    alice.type_line("kick").await;
    let err = alice.expect(is_error).await;
    assert_eq!(
        err,
        Notification::Error {
            message: "Error: specify a name after kick".into()
        }
    );

    alice.type_line("still here").await;
    alice
        .expect(|n| matches!(n, Notification::Chat { text } if text.ends_with("still here")))
        .await;
}

#[tokio::test]
async fn unreachable_broker_reports_and_allows_retry() {
    let bus = LoopbackBus::new();
    bus.set_refusing(true);
    let mut alice = Shell::open(&bus);

    alice.login("Alice").await;
    let err = alice.expect(is_error).await;
    assert!(err.render().contains("Connection error:"), "{err:?}");
    assert_eq!(bus.subscriber_count(TOPIC), 0);

    bus.set_refusing(false);
    alice.login_and_wait("Alice").await;
    assert_eq!(bus.subscriber_count(TOPIC), 1);
}

#[tokio::test]
async fn invalid_name_is_reported() {
    let bus = LoopbackBus::new();
    let mut alice = Shell::open(&bus);

    alice.login("a:b").await;
    let err = alice.expect(is_error).await;
    assert!(err.render().contains("Invalid name"), "{err:?}");

    alice.login_and_wait("ab").await;
}

#[tokio::test]
async fn quit_announces_exit_and_closes_events() {
    let bus = LoopbackBus::new();
    let mut alice = Shell::open(&bus);
    let mut bob = Shell::open(&bus);
    alice.login_and_wait("Alice").await;
    bob.login_and_wait("Bob").await;

    bob.command(ShellCommand::Quit).await;

    let left = alice
        .expect(|n| matches!(n, Notification::Left { .. }))
        .await;
    assert_eq!(left.render(), "<i>\u{274c} Bob left the chat</i>");

    // Bob's session task is gone once the quit completes.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while bob.events.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn kicked_shell_receives_force_close() {
    let bus = LoopbackBus::new();
    let mut alice = Shell::open(&bus);
    let mut bob = Shell::open(&bus);
    alice.login_and_wait("Alice").await;
    bob.login_and_wait("Bob").await;

    alice.type_line("kick Bob").await;

    let forced = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match bob.events.recv().await {
                Some(ShellEvent::ForceClose) => return true,
                Some(_) => {}
                None => return false,
            }
        }
    })
    .await
    .expect("force close did not arrive");
    assert!(forced);
}
