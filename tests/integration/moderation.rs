//! Integration tests for the kick handshake.
//!
//! A kick is published once and acted on only by the peer whose name
//! matches the target: it shows the notice, says goodbye with an EXIT, asks
//! the shell to close, and drops its transport. Everyone else only shows the
//! notice and then processes the farewell like any other EXIT.
//!
//! Verification command: `cargo test --test moderation`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use huddle::membership::{
    Notification, Session, SessionConfig, SessionError, SessionState, ShellEvent,
};
use huddle::transport::loopback::{LoopbackBus, LoopbackTransport};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TOPIC: &str = "huddle/global_chat";

struct Peer {
    session: Arc<Session<LoopbackTransport>>,
    events: mpsc::Receiver<ShellEvent>,
}

async fn join(bus: &LoopbackBus, name: &str) -> Peer {
    let (session, events) = Session::new(SessionConfig {
        topic: TOPIC.to_string(),
        connect_timeout: Duration::from_secs(1),
        event_buffer: 256,
    });
    session.login(name, bus).await.expect("login");
    let session = Arc::new(session);
    let inbound = Arc::clone(&session);
    tokio::spawn(async move {
        inbound.run_inbound().await;
    });
    Peer { session, events }
}

/// Alice, Bob and Carol, fully converged.
async fn trio(bus: &LoopbackBus) -> (Peer, Peer, Peer) {
    let alice = join(bus, "Alice").await;
    let bob = join(bus, "Bob").await;
    let carol = join(bus, "Carol").await;
    for peer in [&alice, &bob, &carol] {
        wait_until(|| peer.session.online().len() == 3).await;
    }
    (alice, bob, carol)
}

async fn wait_until(cond: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

/// Collect events until one matches `pred`, returning all of them.
async fn events_until(
    events: &mut mpsc::Receiver<ShellEvent>,
    pred: impl Fn(&ShellEvent) -> bool,
) -> Vec<ShellEvent> {
    tokio::time::timeout(Duration::from_secs(2), async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("event channel closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

fn is_kick_notice(event: &ShellEvent) -> bool {
    matches!(event, ShellEvent::Notify(Notification::Kicked { .. }))
}

fn online_sorted(peer: &Peer) -> Vec<String> {
    let mut names = peer.session.online();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn target_is_force_closed_and_others_forget_it() {
    let bus = LoopbackBus::new();
    let (mut alice, mut bob, mut carol) = trio(&bus).await;

    alice.session.send("kick Bob").await.expect("send kick");

    let bob_events = events_until(&mut bob.events, |e| *e == ShellEvent::ForceClose).await;
    assert!(bob_events.iter().any(is_kick_notice));
    assert_eq!(bob.session.state(), SessionState::Terminated);

    for peer in [&mut alice, &mut carol] {
        let seen = events_until(&mut peer.events, |e| {
            matches!(e, ShellEvent::Notify(Notification::Left { name }) if name == "Bob")
        })
        .await;
        assert!(seen.iter().any(is_kick_notice));
        assert!(!seen.contains(&ShellEvent::ForceClose));
        assert_eq!(peer.session.state(), SessionState::Connected);
    }

    assert_eq!(online_sorted(&alice), vec!["Alice", "Carol"]);
    assert_eq!(online_sorted(&carol), vec!["Alice", "Carol"]);
    wait_until(|| bus.subscriber_count(TOPIC) == 2).await;
}

#[tokio::test]
async fn every_peer_sees_the_same_notice() {
    let bus = LoopbackBus::new();
    let (mut alice, mut bob, mut carol) = trio(&bus).await;

    alice.session.kick("Bob").await.expect("kick");

    let expected = ShellEvent::Notify(Notification::Kicked {
        target: "Bob".into(),
        admin: "Alice".into(),
    });
    for peer in [&mut alice, &mut bob, &mut carol] {
        let seen = events_until(&mut peer.events, is_kick_notice).await;
        assert_eq!(seen.last(), Some(&expected));
    }
}

#[tokio::test]
async fn kicking_an_absent_name_changes_nothing() {
    let bus = LoopbackBus::new();
    let (mut alice, bob, carol) = trio(&bus).await;

    alice.session.send("kick Zed").await.expect("send kick");
    events_until(&mut alice.events, is_kick_notice).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    for peer in [&alice, &bob, &carol] {
        assert_eq!(peer.session.state(), SessionState::Connected);
        assert_eq!(peer.session.online().len(), 3);
    }
}

#[tokio::test]
async fn kick_with_forged_admin_is_obeyed() {
    let bus = LoopbackBus::new();
    let (_alice, mut bob, _carol) = trio(&bus).await;

    bus.inject(TOPIC, "__KICK__:Bob:NotARealAdmin");

    let seen = events_until(&mut bob.events, |e| *e == ShellEvent::ForceClose).await;
    assert!(seen.contains(&ShellEvent::Notify(Notification::Kicked {
        target: "Bob".into(),
        admin: "NotARealAdmin".into(),
    })));
}

#[tokio::test]
async fn self_kick_terminates_the_requester() {
    let bus = LoopbackBus::new();
    let mut alice = join(&bus, "Alice").await;

    alice.session.send("kick Alice").await.expect("send kick");

    events_until(&mut alice.events, |e| *e == ShellEvent::ForceClose).await;
    assert_eq!(alice.session.state(), SessionState::Terminated);
    wait_until(|| bus.subscriber_count(TOPIC) == 0).await;
}

#[tokio::test]
async fn kicked_session_refuses_further_input() {
    let bus = LoopbackBus::new();
    let (alice, mut bob, _carol) = trio(&bus).await;

    alice.session.kick("Bob").await.expect("kick");
    events_until(&mut bob.events, |e| *e == ShellEvent::ForceClose).await;

    assert!(matches!(
        bob.session.send("still here?").await,
        Err(SessionError::Terminated)
    ));
}

#[tokio::test]
async fn kicked_user_can_log_in_again() {
    let bus = LoopbackBus::new();
    let (alice, mut bob, _carol) = trio(&bus).await;

    alice.session.kick("Bob").await.expect("kick");
    events_until(&mut bob.events, |e| *e == ShellEvent::ForceClose).await;
    wait_until(|| alice.session.online().len() == 2).await;

    let bob_again = join(&bus, "Bob").await;
    wait_until(|| alice.session.online().len() == 3).await;
    wait_until(|| bob_again.session.online().len() == 3).await;
}

#[tokio::test]
async fn bare_kick_is_reported_locally() {
    let bus = LoopbackBus::new();
    let alice = join(&bus, "Alice").await;

    let err = alice.session.send("kick").await.unwrap_err();
    assert!(matches!(err, SessionError::MalformedInput(_)));
    assert_eq!(err.to_string(), "Error: specify a name after kick");
    assert_eq!(alice.session.state(), SessionState::Connected);
}
