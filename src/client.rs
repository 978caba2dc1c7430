//! Async handle for a QuickChat room session.
//!
//! [`ChatClient`] is a thin handle that talks to the background session task
//! over an unbounded MPSC channel.
//! Events are emitted on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<ChatEvent>`]) returned from
//! [`ChatClient::open`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ChatConfig::from_env();
//! let identity = ChatIdentity::new("alice", "42")?;
//! let (mut client, mut events) = ChatClient::open(WebSocketConnector::new(), config, identity)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::SessionEstablished(_) => client.send_message("hello")?,
//!         ChatEvent::Message(msg) => println!("{}: {}", msg.username, msg.text),
//!         ChatEvent::Failed(failure) => {
//!             eprintln!("{failure} [{}]", failure.recovery());
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! client.leave().await?;
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::connection::{Command, ConnectionManager, SharedState};
use crate::error::{ChatError, Result};
use crate::event::ChatEvent;
use crate::failure::Failure;
use crate::identity::ChatIdentity;
use crate::presence::RoomStats;
use crate::protocol::ChatMessage;
use crate::state::{ConnectionState, Session};
use crate::transport::Connector;

/// Async client handle for one chat room session.
///
/// Created via [`ChatClient::open`], which spawns the session task and
/// returns this handle together with an event receiver.
///
/// Commands return as soon as they are queued. Accessors read a snapshot of
/// the state the session task last published.
pub struct ChatClient {
    /// Sender half of the command channel to the session task.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Shared state updated by the session task.
    state: Arc<SharedState>,
    identity: ChatIdentity,
    leave_grace: Duration,
    /// Handle to the background session task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the session task to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ChatClient {
    /// Validate configuration, spawn the session task, and start connecting.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Configuration`] if the config has no server URL.
    /// In that case nothing is spawned and no connection is attempted.
    pub fn open<C: Connector>(
        connector: C,
        config: ChatConfig,
        identity: ChatIdentity,
    ) -> Result<(Self, mpsc::Receiver<ChatEvent>)> {
        let Some(url) = config.endpoint().map(str::to_owned) else {
            warn!("no chat server URL configured, not connecting");
            return Err(ChatError::Configuration(
                "server URL is not set".to_owned(),
            ));
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(SharedState::new());
        info!(identity = %identity, url = %url, "opening chat session");

        let manager = ConnectionManager::new(
            connector,
            url,
            &config,
            identity.clone(),
            Arc::clone(&state),
            event_tx,
        );
        let task = tokio::spawn(manager.run(cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            state,
            identity,
            leave_grace: config.leave_grace,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        Ok((client, event_rx))
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Post a chat message to the room.
    ///
    /// The text is trimmed. Nothing is appended locally; the message shows up
    /// in [`messages`](Self::messages) when the server broadcasts it back.
    ///
    /// # Errors
    ///
    /// - [`ChatError::EmptyMessage`] if the text is blank.
    /// - [`ChatError::NotEstablished`] if no session is established.
    /// - [`ChatError::NotConnected`] if the session task has exited.
    pub fn send_message(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.is_established() {
            return Err(ChatError::NotEstablished);
        }
        self.send(Command::Send(text.to_owned()))
    }

    /// Tell the session the view is visible again. Sends one heartbeat if
    /// the session is established.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session task has exited.
    pub fn announce_visible(&self) -> Result<()> {
        self.send(Command::Visible)
    }

    /// Run the leave sequence and stop the session task.
    ///
    /// Cancels the heartbeat and any pending reconnect, sends `leaveRoom` if
    /// a transport is connected, then disconnects. Resolves once the session
    /// task has acknowledged. A final [`ChatEvent::Left`] is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session task already exited.
    pub async fn leave(&mut self) -> Result<()> {
        debug!("ChatClient: leave requested");
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Leave(ack_tx))?;

        match tokio::time::timeout(self.shutdown_timeout, ack_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("session task exited before acknowledging leave"),
            Err(_) => warn!("session task did not acknowledge leave within timeout"),
        }
        self.join_task().await;
        Ok(())
    }

    /// Shut down the session task. Runs the same leave sequence as
    /// [`leave`](Self::leave), bounded by the shutdown timeout.
    ///
    /// After calling this method, the event receiver yields `None` once the
    /// session task exits. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        debug!("ChatClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join_task().await;
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while a transport is open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` while the session is [`Established`](ConnectionState::Established).
    pub fn is_established(&self) -> bool {
        self.state.established.load(Ordering::Acquire)
    }

    /// Returns `true` until the session task exits.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Reconnect attempts made since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::Acquire)
    }

    pub fn identity(&self) -> &ChatIdentity {
        &self.identity
    }

    /// Delay between the leave sequence and navigating away.
    pub fn leave_grace(&self) -> Duration {
        self.leave_grace
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.connection.lock().await
    }

    /// The current session, if one is established or being resumed.
    pub async fn session(&self) -> Option<Session> {
        self.state.session.lock().await.clone()
    }

    /// Chat messages received so far, in arrival order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.channel.lock().await.messages().to_vec()
    }

    /// The latest room presence snapshot.
    pub async fn room_stats(&self) -> RoomStats {
        self.state.presence.lock().await.stats().clone()
    }

    /// The failure that ended the session, if any.
    pub async fn failure(&self) -> Option<Failure> {
        self.state.failure.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a command to the session task.
    fn send(&self, cmd: Command) -> Result<()> {
        if !self.is_running() {
            return Err(ChatError::NotConnected);
        }
        self.cmd_tx.send(cmd).map_err(|_| ChatError::NotConnected)
    }

    /// Await the session task with a timeout. If it doesn't exit in time,
    /// abort it so the task cannot detach and run indefinitely.
    async fn join_task(&mut self) {
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }
        self.state.running.store(false, Ordering::Release);
        self.state.connected.store(false, Ordering::Release);
        self.state.established.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .field("established", &self.is_established())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // No executor context here to drive the async leave sequence.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use crate::protocol::{ClientMessage, ServerMessage};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records sent frames and replays scripted responses.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, ChatError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ChatError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ChatError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ChatError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect; every later connect fails.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Vec<Option<std::result::Result<String, ChatError>>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn new(
            script: Vec<Option<std::result::Result<String, ChatError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let connector = Self {
                scripts: StdMutex::new(VecDeque::from(vec![script])),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
                attempts: Arc::new(AtomicUsize::new(0)),
            };
            (connector, sent, closed)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(
            &self,
            _url: &str,
            _preference: &[TransportKind],
        ) -> std::result::Result<MockTransport, ChatError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ChatError::Connect("connection refused".into()))?;
            Ok(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn frame(msg: &ServerMessage) -> Option<std::result::Result<String, ChatError>> {
        Some(Ok(serde_json::to_string(msg).unwrap()))
    }

    fn handshake() -> Vec<Option<std::result::Result<String, ChatError>>> {
        vec![
            frame(&ServerMessage::UsernameValidation {
                valid: true,
                error: None,
            }),
            frame(&ServerMessage::SessionEstablished {
                session_id: "sess-abcdef123".into(),
                username: "alice".into(),
                room_id: "42".into(),
            }),
        ]
    }

    fn identity() -> ChatIdentity {
        ChatIdentity::new("alice", "42").unwrap()
    }

    fn config() -> ChatConfig {
        ChatConfig::new("ws://chat.test")
    }

    async fn wait_established(events: &mut mpsc::Receiver<ChatEvent>) -> Session {
        loop {
            match events.recv().await.unwrap() {
                ChatEvent::SessionEstablished(session) => return session,
                ChatEvent::Failed(failure) => panic!("session failed: {failure}"),
                _ => {}
            }
        }
    }

    fn sent_frames(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn open_without_url_spawns_nothing() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let attempts = Arc::clone(&connector.attempts);

        let config = ChatConfig::new("   ");
        let err = ChatClient::open(connector, config, identity()).unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));

        tokio::task::yield_now().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handshake_sends_validate_then_join() {
        let (connector, sent, _closed) = MockConnector::new(handshake());
        let (mut client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();

        let session = wait_established(&mut events).await;
        assert_eq!(session.session_id, "sess-abcdef123");
        assert!(client.is_established());
        assert_eq!(client.state().await, ConnectionState::Established);
        assert_eq!(client.session().await, Some(session));

        let frames = sent_frames(&sent);
        assert!(matches!(frames[0], ClientMessage::ValidateUsername { .. }));
        assert!(matches!(frames[1], ClientMessage::JoinRoom { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn send_message_rejects_blank_text() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let (mut client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();
        wait_established(&mut events).await;

        assert!(matches!(
            client.send_message("   \n"),
            Err(ChatError::EmptyMessage)
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn send_message_before_established_is_refused() {
        let (connector, sent, _closed) = MockConnector::new(vec![]);
        let (mut client, _events) = ChatClient::open(connector, config(), identity()).unwrap();

        assert!(matches!(
            client.send_message("hello"),
            Err(ChatError::NotEstablished)
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sent_frames(&sent)
            .iter()
            .all(|f| !matches!(f, ClientMessage::ChatMessage { .. })));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn send_message_trims_and_queues() {
        let (connector, sent, _closed) = MockConnector::new(handshake());
        let (mut client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();
        wait_established(&mut events).await;

        client.send_message("  hi there  ").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let frames = sent_frames(&sent);
        match frames.last().unwrap() {
            ClientMessage::ChatMessage {
                username,
                text,
                room_id,
                ..
            } => {
                assert_eq!(username, "alice");
                assert_eq!(text, "hi there");
                assert_eq!(room_id, "42");
            }
            other => panic!("expected chatMessage, got {other:?}"),
        }
        assert!(client.messages().await.is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_sends_leave_and_closes_transport() {
        let (connector, sent, closed) = MockConnector::new(handshake());
        let (mut client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();
        wait_established(&mut events).await;

        client.shutdown().await;

        let frames = sent_frames(&sent);
        assert!(matches!(
            frames.last().unwrap(),
            ClientMessage::LeaveRoom { .. }
        ));
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
        assert!(matches!(
            client.send_message("late"),
            Err(ChatError::NotEstablished)
        ));
        assert!(matches!(
            client.announce_visible(),
            Err(ChatError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn leave_emits_left_and_ends_event_stream() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let (mut client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();
        wait_established(&mut events).await;

        client.leave().await.unwrap();

        let mut saw_left = false;
        while let Some(event) = events.recv().await {
            if event == ChatEvent::Left {
                saw_left = true;
            }
        }
        assert!(saw_left);
        assert!(client.session().await.is_none());
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(matches!(client.leave().await, Err(ChatError::NotConnected)));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let (mut client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();
        wait_established(&mut events).await;

        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let (client, mut events) = ChatClient::open(connector, config(), identity()).unwrap();
        wait_established(&mut events).await;

        drop(client);

        // The aborted task drops the event sender; the stream must end.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn zero_event_channel_capacity_does_not_panic() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let config = config()
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_millis(50));
        let (mut client, mut events) = ChatClient::open(connector, config, identity()).unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(
            first,
            ChatEvent::StateChanged(ConnectionState::Connecting)
        );
        client.shutdown().await;
    }

    /// Transport that hangs forever in `close()`.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), ChatError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ChatError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ChatError> {
            std::future::pending().await
        }
    }

    struct HangingConnector {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for HangingConnector {
        type Transport = HangingCloseTransport;

        async fn connect(
            &self,
            _url: &str,
            _preference: &[TransportKind],
        ) -> std::result::Result<HangingCloseTransport, ChatError> {
            Ok(HangingCloseTransport {
                dropped: Arc::clone(&self.dropped),
            })
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_session_task() {
        let dropped = Arc::new(AtomicBool::new(false));
        let connector = HangingConnector {
            dropped: Arc::clone(&dropped),
        };
        let config = config().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = ChatClient::open(connector, config, identity()).unwrap();

        loop {
            if let ChatEvent::Connected { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        client.shutdown().await;
        assert!(
            dropped.load(Ordering::Acquire),
            "timed-out shutdown should abort and drop the session task"
        );
        assert!(!client.is_connected());
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (connector, _sent, _closed) = MockConnector::new(handshake());
        let (mut client, _events) = ChatClient::open(connector, config(), identity()).unwrap();

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("ChatClient"));
        assert!(debug_str.contains("established"));

        client.shutdown().await;
    }
}
