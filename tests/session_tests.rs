#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! End-to-end session lifecycle tests.
//!
//! Drives a real `ChatClient` against the scripted `MockConnector` from
//! `tests/common`. Timer-dependent tests run on a paused clock so backoff and
//! heartbeat cadence are exact.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use quickchat_client::protocol::{ChatMessage, ClientMessage};
use quickchat_client::{
    ChatClient, ChatConfig, ChatError, ChatEvent, ChatIdentity, ConnectionState, FailureKind,
    NavigationDecision, NavigationEvent, NavigationGuard, Navigator, RecoveryAction,
};
use tokio::sync::mpsc;

use common::{
    closed, handshake, kicked, message, room_stats, server_error, validation, MockConnector,
    MockServer, Script, ROOM, SESSION_ID, USERNAME,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn config() -> ChatConfig {
    ChatConfig::new("ws://chat.test/socket")
}

fn identity() -> ChatIdentity {
    ChatIdentity::new(USERNAME, ROOM).unwrap()
}

fn open(scripts: Vec<Script>) -> (ChatClient, mpsc::Receiver<ChatEvent>, MockServer) {
    let (connector, server) = MockConnector::new(scripts);
    let (client, events) = ChatClient::open(connector, config(), identity()).unwrap();
    (client, events, server)
}

/// Collect events up to and including the first one matching `done`.
async fn collect_until(
    events: &mut mpsc::Receiver<ChatEvent>,
    mut done: impl FnMut(&ChatEvent) -> bool,
) -> Vec<ChatEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv()
            .await
            .unwrap_or_else(|| panic!("event stream ended early; saw {seen:?}"));
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
}

async fn until_established(events: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    collect_until(events, |e| matches!(e, ChatEvent::SessionEstablished(_))).await
}

async fn until_failed(events: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    collect_until(events, |e| matches!(e, ChatEvent::Failed(_))).await
}

fn states(events: &[ChatEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Configuration
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn missing_server_url_fails_without_connecting() {
    let (connector, server) = MockConnector::single(handshake());
    let err = ChatClient::open(connector, ChatConfig::new(""), identity()).unwrap_err();

    assert!(matches!(err, ChatError::Configuration(_)));
    let failure = err.as_failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Configuration);
    assert_eq!(failure.recovery(), RecoveryAction::NavigateHome);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(server.attempts(), 0);
}

// ════════════════════════════════════════════════════════════════════
// Handshake
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn handshake_walks_connecting_validating_established() {
    let (mut client, mut events, server) = open(vec![Script::Frames(handshake())]);

    let seen = until_established(&mut events).await;
    assert_eq!(
        states(&seen),
        [
            ConnectionState::Connecting,
            ConnectionState::Validating,
            ConnectionState::Established,
        ]
    );
    assert!(seen
        .iter()
        .any(|e| matches!(e, ChatEvent::Connected { .. })));

    let frames = server.frames();
    assert_eq!(
        frames,
        [
            ClientMessage::ValidateUsername {
                username: USERNAME.into(),
                room_id: ROOM.into(),
            },
            ClientMessage::JoinRoom {
                username: USERNAME.into(),
                room_id: ROOM.into(),
            },
        ]
    );

    let session = client.session().await.unwrap();
    assert_eq!(session.session_id, SESSION_ID);
    assert_eq!(session.short_id(), "a1b2c3");
    assert_eq!(client.reconnect_attempts(), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn rejected_username_never_sends_join() {
    let (mut client, mut events, server) = open(vec![Script::Frames(vec![validation(
        false,
        Some("Username already taken"),
    )])]);

    let seen = until_failed(&mut events).await;
    let Some(ChatEvent::Failed(failure)) = seen.last() else {
        panic!("expected Failed, got {seen:?}");
    };
    assert_eq!(failure.kind, FailureKind::Validation);
    assert_eq!(failure.message, "Username already taken");
    assert_eq!(failure.title(), "Cannot Join Room");
    assert_eq!(failure.recovery(), RecoveryAction::NavigateHome);

    assert_eq!(server.count("joinRoom"), 0);
    assert_eq!(server.attempts(), 1);
    assert_eq!(client.state().await, ConnectionState::Error);
    assert!(client.session().await.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn rejection_without_reason_uses_default_message() {
    let (mut client, mut events, _server) =
        open(vec![Script::Frames(vec![validation(false, None)])]);

    until_failed(&mut events).await;
    assert_eq!(
        client.failure().await.unwrap().message,
        "Username validation failed"
    );

    client.shutdown().await;
}

#[tokio::test]
async fn session_for_another_identity_fails_the_handshake() {
    let mismatched = common::frame(&quickchat_client::ServerMessage::SessionEstablished {
        session_id: "other".into(),
        username: "mallory".into(),
        room_id: ROOM.into(),
    });
    let (mut client, mut events, server) = open(vec![Script::Frames(vec![
        validation(true, None),
        mismatched,
        common::established(),
    ])]);

    let seen = until_failed(&mut events).await;
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ChatEvent::SessionEstablished(_))));
    assert_eq!(client.state().await, ConnectionState::Error);
    assert!(client.session().await.is_none());

    let failure = client.failure().await.unwrap();
    assert_eq!(failure.kind, FailureKind::Server);
    assert!(failure.message.contains("mallory"), "{}", failure.message);
    assert_eq!(failure.recovery(), RecoveryAction::Reload);
    assert_eq!(server.closes(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn drop_while_validating_restarts_the_handshake() {
    let (mut client, mut events, server) = open(vec![
        Script::Frames(vec![validation(true, None), closed()]),
        // A stale establish with no validation on this connection.
        Script::Frames(vec![common::established()]),
    ]);

    let mut validating = 0;
    collect_until(&mut events, |e| {
        if matches!(e, ChatEvent::StateChanged(ConnectionState::Validating)) {
            validating += 1;
        }
        validating == 2
    })
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        server.frames_on(0),
        [
            ClientMessage::ValidateUsername {
                username: USERNAME.into(),
                room_id: ROOM.into(),
            },
            ClientMessage::JoinRoom {
                username: USERNAME.into(),
                room_id: ROOM.into(),
            },
        ]
    );
    assert_eq!(
        server.frames_on(1),
        [ClientMessage::ValidateUsername {
            username: USERNAME.into(),
            room_id: ROOM.into(),
        }]
    );
    assert_eq!(client.state().await, ConnectionState::Validating);
    assert!(client.session().await.is_none());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnect policy
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn refused_connects_exhaust_after_three_retries() {
    let (mut client, mut events, server) = open(vec![]);

    let seen = until_failed(&mut events).await;

    let delays: Vec<(u32, Duration)> = seen
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Reconnecting { attempt, delay } => Some((*attempt, *delay)),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        [
            (1, Duration::from_secs(2)),
            (2, Duration::from_secs(4)),
            (3, Duration::from_secs(6)),
        ]
    );
    assert_eq!(server.attempts(), 4);

    let failure = client.failure().await.unwrap();
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(failure.message.contains("unable to connect"));
    assert_eq!(failure.recovery(), RecoveryAction::Reload);
    assert_eq!(client.state().await, ConnectionState::Error);

    // No retry after the terminal failure.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.attempts(), 4);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_attempts() {
    let (mut client, mut events, _server) = open(vec![
        Script::Frames(vec![validation(true, None), common::established(), closed()]),
        Script::Refuse,
        Script::Frames(vec![closed()]),
    ]);

    until_established(&mut events).await;

    // Drop → attempt 1, refused → attempt 2, connect succeeds then drops
    // again → counter starts over at 1.
    let seen = collect_until(&mut events, |e| {
        matches!(e, ChatEvent::Reconnecting { .. })
    })
    .await;
    assert!(matches!(
        seen.last(),
        Some(ChatEvent::Reconnecting { attempt: 1, .. })
    ));
    let seen = collect_until(&mut events, |e| {
        matches!(e, ChatEvent::Reconnecting { .. })
    })
    .await;
    assert!(matches!(
        seen.last(),
        Some(ChatEvent::Reconnecting { attempt: 2, .. })
    ));
    let seen = collect_until(&mut events, |e| {
        matches!(e, ChatEvent::Reconnecting { .. })
    })
    .await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, ChatEvent::Connected { .. })));
    assert_eq!(
        seen.last(),
        Some(&ChatEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(2),
        })
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_resumes_existing_session() {
    let (mut client, mut events, server) = open(vec![
        Script::Frames(vec![validation(true, None), common::established(), closed()]),
        Script::Frames(vec![]),
    ]);

    until_established(&mut events).await;
    let seen = collect_until(&mut events, |e| {
        matches!(e, ChatEvent::StateChanged(ConnectionState::Established))
    })
    .await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, ChatEvent::Reconnecting { attempt: 1, .. })));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let resumed = server.frames_on(1);
    assert_eq!(
        resumed,
        [ClientMessage::Heartbeat {
            username: USERNAME.into(),
            room_id: ROOM.into(),
            session_id: SESSION_ID.into(),
        }]
    );
    assert!(client.is_established());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Heartbeat
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn heartbeat_fires_every_thirty_seconds() {
    let (mut client, mut events, server) = open(vec![Script::Frames(handshake())]);
    until_established(&mut events).await;

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(server.count("heartbeat"), 0);

    tokio::time::sleep(Duration::from_secs(32)).await;
    assert_eq!(server.count("heartbeat"), 2);
    assert!(server.frames().iter().all(|f| match f {
        ClientMessage::Heartbeat { session_id, .. } => session_id == SESSION_ID,
        _ => true,
    }));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_heartbeat() {
    let mut frames = handshake();
    frames.push(closed());
    let (mut client, mut events, server) = open(vec![Script::Frames(frames)]);

    until_established(&mut events).await;
    until_failed(&mut events).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(server.count("heartbeat"), 0);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_sends_one_heartbeat() {
    let (mut client, mut events, server) = open(vec![Script::Frames(handshake())]);
    until_established(&mut events).await;

    client.announce_visible().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(server.count("heartbeat"), 1);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Server-initiated termination
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn kick_tears_down_without_leave_or_retry() {
    let mut frames = handshake();
    frames.push(kicked("duplicate login"));
    let (mut client, mut events, server) = open(vec![Script::Frames(frames)]);

    until_established(&mut events).await;
    let seen = until_failed(&mut events).await;
    assert_eq!(states(&seen), [ConnectionState::Kicked]);

    let failure = client.failure().await.unwrap();
    assert_eq!(failure.title(), "Session Terminated");
    assert!(failure.message.contains("duplicate login"));
    assert_eq!(failure.recovery(), RecoveryAction::NavigateHome);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(server.count("heartbeat"), 0);
    assert_eq!(server.count("leaveRoom"), 0);
    assert_eq!(server.attempts(), 1);
    assert_eq!(server.closes(), 1);
    assert!(client.session().await.is_none());
    assert!(!client.is_connected());

    // Shutting down after a kick still sends nothing.
    client.shutdown().await;
    assert_eq!(server.count("leaveRoom"), 0);
}

#[tokio::test]
async fn invalid_session_is_terminal() {
    let mut frames = handshake();
    frames.push(common::frame(&quickchat_client::ServerMessage::SessionInvalid));
    let (mut client, mut events, _server) = open(vec![Script::Frames(frames)]);

    until_failed(&mut events).await;
    assert_eq!(client.state().await, ConnectionState::Kicked);
    assert_eq!(
        client.failure().await.unwrap().message,
        "Session expired or invalid"
    );

    client.shutdown().await;
}

#[tokio::test]
async fn server_error_offers_reload() {
    let mut frames = handshake();
    frames.push(server_error("room is closed"));
    let (mut client, mut events, _server) = open(vec![Script::Frames(frames)]);

    until_failed(&mut events).await;
    let failure = client.failure().await.unwrap();
    assert_eq!(failure.kind, FailureKind::Server);
    assert_eq!(failure.message, "room is closed");
    assert_eq!(failure.recovery(), RecoveryAction::Reload);

    client.shutdown().await;
}

#[tokio::test]
async fn send_after_kick_is_refused() {
    let mut frames = handshake();
    frames.push(kicked("admin"));
    let (mut client, mut events, _server) = open(vec![Script::Frames(frames)]);

    until_failed(&mut events).await;
    assert!(matches!(
        client.send_message("anyone there?"),
        Err(ChatError::NotEstablished)
    ));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Messages and presence
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn messages_are_kept_in_arrival_order() {
    let mut frames = handshake();
    frames.push(message("bob", "first", 30));
    frames.push(message("carol", "second", 10));
    frames.push(message("bob", "third", 20));
    let (mut client, mut events, _server) = open(vec![Script::Frames(frames)]);

    collect_until(&mut events, |e| {
        matches!(e, ChatEvent::Message(m) if m.text == "third")
    })
    .await;

    let texts: Vec<String> = client
        .messages()
        .await
        .into_iter()
        .map(|m: ChatMessage| m.text)
        .collect();
    assert_eq!(texts, ["first", "second", "third"]);

    client.shutdown().await;
}

#[tokio::test]
async fn sent_message_appears_only_when_echoed() {
    let (mut client, mut events, server) = open(vec![Script::Frames(handshake())]);
    until_established(&mut events).await;

    client.send_message("  hello  ").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    match server.frames().last().unwrap() {
        ClientMessage::ChatMessage {
            username,
            text,
            room_id,
            ..
        } => {
            assert_eq!(username, USERNAME);
            assert_eq!(text, "hello");
            assert_eq!(room_id, ROOM);
        }
        other => panic!("expected chatMessage, got {other:?}"),
    }
    assert!(client.messages().await.is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn room_stats_replace_previous_snapshot() {
    let mut frames = handshake();
    frames.push(room_stats(&["alice", "bob", "carol"]));
    frames.push(room_stats(&["alice"]));
    let (mut client, mut events, _server) = open(vec![Script::Frames(frames)]);

    collect_until(&mut events, |e| {
        matches!(e, ChatEvent::RoomStats(stats) if stats.user_count == 1)
    })
    .await;

    let stats = client.room_stats().await;
    assert_eq!(stats.user_count, 1);
    assert_eq!(stats.active_users.len(), 1);
    assert!(stats.active_users.contains("alice"));

    client.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let mut frames = handshake();
    frames.push(Some(Ok("{not json".into())));
    frames.push(Some(Ok(r#"{"type":"somethingNew","data":{}}"#.into())));
    frames.push(message("bob", "still here", 1));
    let (mut client, mut events, _server) = open(vec![Script::Frames(frames)]);

    collect_until(&mut events, |e| matches!(e, ChatEvent::Message(_))).await;
    assert!(client.is_established());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Leave
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn leave_sends_leave_room_and_stops_everything() {
    let (mut client, mut events, server) = open(vec![Script::Frames(handshake())]);
    until_established(&mut events).await;

    client.leave().await.unwrap();

    assert_eq!(
        server.frames().last(),
        Some(&ClientMessage::LeaveRoom {
            username: USERNAME.into(),
            room_id: ROOM.into(),
        })
    );
    assert_eq!(server.closes(), 1);

    let rest = collect_until(&mut events, |e| *e == ChatEvent::Left).await;
    assert_eq!(states(&rest), [ConnectionState::Disconnected]);
    assert!(events.recv().await.is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(server.count("heartbeat"), 0);
    assert_eq!(server.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn leave_during_backoff_cancels_reconnect() {
    let mut frames = handshake();
    frames.push(closed());
    let (mut client, mut events, server) = open(vec![Script::Frames(frames)]);

    collect_until(&mut events, |e| matches!(e, ChatEvent::Reconnecting { .. })).await;
    client.leave().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(server.attempts(), 1);
    assert_eq!(server.count("leaveRoom"), 0);
}

#[tokio::test(start_paused = true)]
async fn back_during_backoff_stops_the_session() {
    let mut frames = handshake();
    frames.push(closed());
    let (mut client, mut events, server) =
        open(vec![Script::Frames(frames), Script::Frames(handshake())]);

    collect_until(&mut events, |e| matches!(e, ChatEvent::Reconnecting { .. })).await;
    let guard = NavigationGuard::new(EntryNavigator::default());
    let decision = guard
        .handle(&mut client, NavigationEvent::Back)
        .await
        .unwrap();

    assert_eq!(decision, NavigationDecision::Left);
    assert!(!client.is_running());
    assert_eq!(guard.navigator().entries.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(server.attempts(), 1);
    assert_eq!(server.count("heartbeat"), 0);
    assert_eq!(server.count("leaveRoom"), 0);
}

/// Confirms nothing and records entry-point navigations.
#[derive(Default)]
struct EntryNavigator {
    entries: AtomicUsize,
}

impl Navigator for EntryNavigator {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }

    fn trap_history(&self) {}

    fn navigate_to_entry(&self) {
        self.entries.fetch_add(1, Ordering::SeqCst);
    }
}
