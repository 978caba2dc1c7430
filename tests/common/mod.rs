#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for QuickChat client integration tests.
//!
//! Provides a scripted [`MockConnector`] that hands out one [`MockTransport`]
//! per connect, plus helpers for building server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use quickchat_client::protocol::{ChatMessage, ClientMessage, RoomStatsPayload, ServerMessage};
use quickchat_client::{ChatError, Connector, Transport, TransportKind};

pub type Incoming = Option<Result<String, ChatError>>;

/// What the mock server does on one connect attempt.
pub enum Script {
    /// Refuse the connection.
    Refuse,
    /// Accept, then yield these frames in order. An explicit `None` closes
    /// the connection; after the last frame the connection idles.
    Frames(Vec<Incoming>),
}

/// A frame the client sent, tagged with the connection it went out on.
#[derive(Debug, Clone)]
pub struct Sent {
    pub connection: usize,
    pub frame: ClientMessage,
}

/// Inspection handles shared between the test and the mock connector.
#[derive(Clone, Default)]
pub struct MockServer {
    sent: Arc<StdMutex<Vec<Sent>>>,
    attempts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockServer {
    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of transports the client closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Every frame the client sent, in order.
    pub fn frames(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.frame.clone())
            .collect()
    }

    /// Frames sent on the `connection`-th successful connection (0-based).
    pub fn frames_on(&self, connection: usize) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.connection == connection)
            .map(|s| s.frame.clone())
            .collect()
    }

    /// Frames whose wire name is `name`.
    pub fn count(&self, name: &str) -> usize {
        self.frames().iter().filter(|f| f.name() == name).count()
    }
}

// ── MockTransport ───────────────────────────────────────────────────

/// Replays scripted server frames and records what the client sends.
pub struct MockTransport {
    connection: usize,
    incoming: VecDeque<Incoming>,
    server: MockServer,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        let frame: ClientMessage = serde_json::from_str(&message).unwrap();
        self.server.sent.lock().unwrap().push(Sent {
            connection: self.connection,
            frame,
        });
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Idle until the client closes or shuts down.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Runs one [`Script`] per connect attempt. Once the scripts run out, every
/// further attempt is refused.
pub struct MockConnector {
    scripts: StdMutex<VecDeque<Script>>,
    accepted: AtomicUsize,
    server: MockServer,
}

impl MockConnector {
    pub fn new(scripts: Vec<Script>) -> (Self, MockServer) {
        let server = MockServer::default();
        let connector = Self {
            scripts: StdMutex::new(VecDeque::from(scripts)),
            accepted: AtomicUsize::new(0),
            server: server.clone(),
        };
        (connector, server)
    }

    /// A connector whose single connection yields `frames`.
    pub fn single(frames: Vec<Incoming>) -> (Self, MockServer) {
        Self::new(vec![Script::Frames(frames)])
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(
        &self,
        _url: &str,
        _preference: &[TransportKind],
    ) -> Result<MockTransport, ChatError> {
        self.server.attempts.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Frames(frames)) => Ok(MockTransport {
                connection: self.accepted.fetch_add(1, Ordering::SeqCst),
                incoming: VecDeque::from(frames),
                server: self.server.clone(),
            }),
            Some(Script::Refuse) | None => Err(ChatError::Connect("connection refused".into())),
        }
    }
}

// ── Server frame helpers ────────────────────────────────────────────

pub const USERNAME: &str = "alice";
pub const ROOM: &str = "42";
pub const SESSION_ID: &str = "a1b2c3d4e5f6";

pub fn frame(msg: &ServerMessage) -> Incoming {
    Some(Ok(serde_json::to_string(msg).expect("server frame serialization")))
}

/// A clean server-side close.
pub fn closed() -> Incoming {
    None
}

pub fn validation(valid: bool, error: Option<&str>) -> Incoming {
    frame(&ServerMessage::UsernameValidation {
        valid,
        error: error.map(Into::into),
    })
}

pub fn established() -> Incoming {
    frame(&ServerMessage::SessionEstablished {
        session_id: SESSION_ID.into(),
        username: USERNAME.into(),
        room_id: ROOM.into(),
    })
}

/// `usernameValidation{valid}` followed by `sessionEstablished`.
pub fn handshake() -> Vec<Incoming> {
    vec![validation(true, None), established()]
}

pub fn kicked(reason: &str) -> Incoming {
    frame(&ServerMessage::SessionKicked {
        reason: reason.into(),
        timestamp: 1_700_000_000_000,
    })
}

pub fn message(username: &str, text: &str, timestamp: u64) -> Incoming {
    frame(&ServerMessage::Message(ChatMessage {
        username: username.into(),
        text: text.into(),
        timestamp,
    }))
}

pub fn room_stats(users: &[&str]) -> Incoming {
    frame(&ServerMessage::RoomStats(RoomStatsPayload {
        user_count: users.len() as u32,
        active_users: users.iter().map(|u| (*u).to_owned()).collect(),
    }))
}

pub fn server_error(message: &str) -> Incoming {
    frame(&ServerMessage::Error {
        message: message.into(),
    })
}
