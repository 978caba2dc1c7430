//! The session task: one transport, one state machine, one event loop.
//!
//! [`ConnectionManager`] exclusively owns the connector, the live transport,
//! the reconnect timer and the heartbeat. It runs as a single background task
//! that multiplexes, via `tokio::select!`:
//!
//! - commands from the [`ChatClient`](crate::client::ChatClient) handle
//! - the shutdown signal
//! - the in-flight connect attempt
//! - inbound frames from the transport
//! - the heartbeat interval
//! - the reconnect delay
//!
//! Every branch runs to completion before the next is polled, so events are
//! handled one at a time in the order the task observes them. Timers are plain
//! fields; clearing a field drops the timer, so a cancelled heartbeat or
//! reconnect can never fire.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::MessageChannel;
use crate::config::{ChatConfig, TransportKind};
use crate::error::ChatError;
use crate::event::ChatEvent;
use crate::failure::{Failure, FailureKind};
use crate::heartbeat::HeartbeatMonitor;
use crate::identity::ChatIdentity;
use crate::negotiator::{EstablishOutcome, SessionNegotiator, ValidationOutcome};
use crate::presence::RoomPresenceTracker;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{ConnectionState, ReconnectPolicy, Session};
use crate::transport::{Connector, Transport};

type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T, ChatError>> + Send>>;

/// Requests from the client handle to the session task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Post a chat message (already trimmed by the handle).
    Send(String),
    /// The view regained foreground visibility.
    Visible,
    /// Run the leave sequence, acknowledge, and exit.
    Leave(oneshot::Sender<()>),
}

// ── Shared state ────────────────────────────────────────────────────

/// State written by the session task and read by the handle.
pub(crate) struct SharedState {
    pub(crate) running: AtomicBool,
    pub(crate) connected: AtomicBool,
    pub(crate) established: AtomicBool,
    pub(crate) attempts: AtomicU32,
    pub(crate) connection: Mutex<ConnectionState>,
    pub(crate) session: Mutex<Option<Session>>,
    pub(crate) channel: Mutex<MessageChannel>,
    pub(crate) presence: Mutex<RoomPresenceTracker>,
    pub(crate) failure: Mutex<Option<Failure>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            established: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            connection: Mutex::new(ConnectionState::Idle),
            session: Mutex::new(None),
            channel: Mutex::new(MessageChannel::new()),
            presence: Mutex::new(RoomPresenceTracker::new()),
            failure: Mutex::new(None),
        }
    }
}

// ── Connection manager ──────────────────────────────────────────────

/// Owner of the transport and the session lifecycle.
pub(crate) struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    url: String,
    transports: Vec<TransportKind>,
    connect_timeout: Duration,
    connecting: Option<ConnectFuture<C::Transport>>,
    transport: Option<C::Transport>,
    connection_id: Option<Uuid>,
    state: ConnectionState,
    policy: ReconnectPolicy,
    reconnect_at: Option<Pin<Box<Sleep>>>,
    negotiator: SessionNegotiator,
    heartbeat: HeartbeatMonitor,
    shared: Arc<SharedState>,
    events: mpsc::Sender<ChatEvent>,
}

impl<C: Connector> ConnectionManager<C> {
    pub(crate) fn new(
        connector: C,
        url: String,
        config: &ChatConfig,
        identity: ChatIdentity,
        shared: Arc<SharedState>,
        events: mpsc::Sender<ChatEvent>,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            url,
            transports: config.transports.clone(),
            connect_timeout: config.connect_timeout,
            connecting: None,
            transport: None,
            connection_id: None,
            state: ConnectionState::Idle,
            policy: ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_step),
            reconnect_at: None,
            negotiator: SessionNegotiator::new(identity),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval),
            shared,
            events,
        }
    }

    /// Drive the session until leave, shutdown, or the handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!(identity = %self.negotiator.identity(), "session task started");
        self.begin_connect().await;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Send(text)) => self.send_chat(&text).await,
                        Some(Command::Visible) => self.announce_visible().await,
                        Some(Command::Leave(ack)) => {
                            self.leave_room().await;
                            let _ = ack.send(());
                            emit_critical(&self.events, ChatEvent::Left).await;
                            break;
                        }
                        None => {
                            debug!("command channel closed, leaving room");
                            self.leave_room().await;
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    self.leave_room().await;
                    emit_critical(&self.events, ChatEvent::Left).await;
                    break;
                }

                result = poll_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }

                incoming = recv_from(&mut self.transport) => {
                    self.on_incoming(incoming).await;
                }

                () = self.heartbeat.tick() => {
                    self.send_heartbeat().await;
                }

                () = sleep_on(&mut self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.begin_connect().await;
                }
            }
        }

        self.shared.running.store(false, Ordering::Release);
        debug!("session task exited");
    }

    // ── Connection lifecycle ────────────────────────────────────────

    async fn begin_connect(&mut self) {
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let preference = self.transports.clone();
        let timeout = self.connect_timeout;
        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&url, &preference)).await {
                Ok(result) => result,
                Err(_) => Err(ChatError::Timeout),
            }
        }));
        self.transition(ConnectionState::Connecting).await;
    }

    async fn on_connect_result(&mut self, result: Result<C::Transport, ChatError>) {
        match result {
            Ok(transport) => self.on_connected(transport).await,
            Err(e) => {
                warn!(error = %e, attempts = self.policy.attempts(), "connect failed");
                self.on_connection_lost(Some(format!("connect error: {e}")))
                    .await;
            }
        }
    }

    async fn on_connected(&mut self, transport: C::Transport) {
        self.policy.reset();
        self.shared.attempts.store(0, Ordering::Release);

        let connection_id = Uuid::new_v4();
        self.connection_id = Some(connection_id);
        self.transport = Some(transport);
        self.shared.connected.store(true, Ordering::Release);
        info!(%connection_id, url = %self.url, "connected to chat server");
        emit_event(&self.events, ChatEvent::Connected { connection_id }).await;

        let existing = self.shared.session.lock().await.clone();
        match existing {
            Some(session) => {
                // The server answers a stale token with `sessionInvalid`.
                debug!(session = session.short_id(), "resuming session after reconnect");
                self.transition(ConnectionState::Established).await;
                self.heartbeat.start();
                self.send_frame(&HeartbeatMonitor::frame(&session)).await;
            }
            None => {
                let frame = self.negotiator.begin();
                self.transition(ConnectionState::Validating).await;
                self.send_frame(&frame).await;
            }
        }
    }

    /// Unintentional loss of the transport, or a failed connect.
    async fn on_connection_lost(&mut self, reason: Option<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.drop_transport().await;
        self.heartbeat.cancel();
        self.negotiator.reset();
        emit_event(&self.events, ChatEvent::Disconnected { reason }).await;

        match self.policy.next_delay() {
            Some(delay) => {
                let attempt = self.policy.attempts();
                self.shared.attempts.store(attempt, Ordering::Release);
                info!(
                    attempt,
                    max = self.policy.max(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.reconnect_at = Some(Box::pin(tokio::time::sleep(delay)));
                self.transition(ConnectionState::Reconnecting).await;
                emit_event(&self.events, ChatEvent::Reconnecting { attempt, delay }).await;
            }
            None => {
                error!(max = self.policy.max(), "reconnect attempts exhausted");
                self.terminate(ConnectionState::Error, Failure::reconnect_exhausted())
                    .await;
            }
        }
    }

    /// Enter `Kicked` or `Error`. No `leaveRoom` is sent and nothing is
    /// retried afterwards.
    async fn terminate(&mut self, state: ConnectionState, failure: Failure) {
        self.heartbeat.cancel();
        self.reconnect_at = None;
        self.connecting = None;
        self.negotiator.reset();
        self.drop_transport().await;

        *self.shared.session.lock().await = None;
        *self.shared.failure.lock().await = Some(failure.clone());
        warn!(kind = ?failure.kind, message = %failure.message, "session ended");

        self.transition(state).await;
        emit_critical(&self.events, ChatEvent::Failed(failure)).await;
    }

    /// Cancel heartbeat, emit `leaveRoom` if connected, disconnect.
    async fn leave_room(&mut self) {
        self.heartbeat.cancel();
        self.reconnect_at = None;
        self.connecting = None;
        self.negotiator.reset();

        if let Some(mut transport) = self.transport.take() {
            let identity = self.negotiator.identity();
            let frame = ClientMessage::LeaveRoom {
                username: identity.username().to_owned(),
                room_id: identity.room_id(),
            };
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if let Err(e) = transport.send(json).await {
                        warn!(error = %e, "failed to send leaveRoom");
                    }
                }
                Err(e) => error!("failed to serialize leaveRoom: {e}"),
            }
            if let Err(e) = transport.close().await {
                debug!(error = %e, "transport close failed during leave");
            }
        }
        self.connection_id = None;
        self.shared.connected.store(false, Ordering::Release);
        *self.shared.session.lock().await = None;

        if !self.state.is_terminal() {
            self.transition(ConnectionState::Disconnected).await;
        }
        info!("left room");
    }

    async fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "transport close failed");
            }
        }
        self.connection_id = None;
        self.shared.connected.store(false, Ordering::Release);
    }

    // ── Outbound ────────────────────────────────────────────────────

    async fn send_frame(&mut self, msg: &ClientMessage) {
        let Some(transport) = self.transport.as_mut() else {
            warn!(event = msg.name(), "no transport, dropping frame");
            return;
        };
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize {}: {e}", msg.name());
                return;
            }
        };
        debug!(event = msg.name(), connection_id = ?self.connection_id, "sending");
        if let Err(e) = transport.send(json).await {
            error!(error = %e, "transport send error");
            self.on_connection_lost(Some(format!("transport send error: {e}")))
                .await;
        }
    }

    async fn send_chat(&mut self, text: &str) {
        if !self.state.is_established() {
            warn!(state = %self.state, "dropping chat message: session not established");
            return;
        }
        let session = self.shared.session.lock().await.clone();
        match MessageChannel::compose(text, session.as_ref()) {
            Ok(frame) => self.send_frame(&frame).await,
            Err(e) => warn!(error = %e, "dropping chat message"),
        }
    }

    async fn send_heartbeat(&mut self) {
        if !self.state.is_established() {
            return;
        }
        let session = self.shared.session.lock().await.clone();
        if let Some(session) = session {
            self.send_frame(&HeartbeatMonitor::frame(&session)).await;
        }
    }

    async fn announce_visible(&mut self) {
        if self.state.is_established() && self.transport.is_some() {
            debug!("view visible again, sending heartbeat");
            self.send_heartbeat().await;
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    async fn on_incoming(&mut self, incoming: Option<Result<String, ChatError>>) {
        match incoming {
            Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => self.on_server_message(msg).await,
                Err(e) => warn!("failed to deserialize server frame: {e}; raw: {text}"),
            },
            Some(Err(e)) => {
                error!(error = %e, "transport receive error");
                self.on_connection_lost(Some(format!("transport receive error: {e}")))
                    .await;
            }
            None => {
                debug!("transport closed by server");
                self.on_connection_lost(None).await;
            }
        }
    }

    async fn on_server_message(&mut self, msg: ServerMessage) {
        if self.state.is_terminal() {
            debug!(event = msg.name(), "ignoring frame after session end");
            return;
        }
        debug!(event = msg.name(), state = %self.state, "received");

        match msg {
            ServerMessage::UsernameValidation { valid, error } => {
                match self.negotiator.on_validation(valid, error) {
                    ValidationOutcome::Join(frame) => self.send_frame(&frame).await,
                    ValidationOutcome::Rejected(reason) => {
                        self.terminate(
                            ConnectionState::Error,
                            Failure::new(FailureKind::Validation, reason),
                        )
                        .await;
                    }
                    ValidationOutcome::Ignored => {}
                }
            }
            ServerMessage::SessionEstablished {
                session_id,
                username,
                room_id,
            } => {
                match self
                    .negotiator
                    .on_established(session_id, &username, &room_id)
                {
                    EstablishOutcome::Established(session) => {
                        info!(session = session.short_id(), "session established");
                        *self.shared.session.lock().await = Some(session.clone());
                        self.transition(ConnectionState::Established).await;
                        self.heartbeat.start();
                        emit_event(&self.events, ChatEvent::SessionEstablished(session)).await;
                    }
                    EstablishOutcome::Mismatched { username, room_id } => {
                        let message = format!(
                            "Server issued a session for {username} in room {room_id} instead of {}",
                            self.negotiator.identity()
                        );
                        self.terminate(
                            ConnectionState::Error,
                            Failure::new(FailureKind::Server, message),
                        )
                        .await;
                    }
                    EstablishOutcome::Ignored => {}
                }
            }
            ServerMessage::SessionKicked { reason, .. } => {
                self.terminate(ConnectionState::Kicked, Failure::kicked(&reason))
                    .await;
            }
            ServerMessage::SessionInvalid => {
                self.terminate(ConnectionState::Kicked, Failure::session_invalid())
                    .await;
            }
            ServerMessage::HeartbeatAck => {
                emit_event(&self.events, ChatEvent::HeartbeatAck).await;
            }
            ServerMessage::Message(message) => {
                self.shared.channel.lock().await.receive(message.clone());
                emit_event(&self.events, ChatEvent::Message(message)).await;
            }
            ServerMessage::RoomStats(payload) => {
                let stats = self.shared.presence.lock().await.apply(payload).clone();
                emit_event(&self.events, ChatEvent::RoomStats(stats)).await;
            }
            ServerMessage::Error { message } => {
                self.terminate(
                    ConnectionState::Error,
                    Failure::new(FailureKind::Server, message),
                )
                .await;
            }
        }
    }

    // ── State ───────────────────────────────────────────────────────

    async fn transition(&mut self, to: ConnectionState) {
        if self.state == to {
            return;
        }
        debug!(from = %self.state, to = %to, "state transition");
        self.state = to;
        *self.shared.connection.lock().await = to;
        self.shared
            .established
            .store(to.is_established(), Ordering::Release);
        emit_event(&self.events, ChatEvent::StateChanged(to)).await;
    }
}

// ── Select helpers ──────────────────────────────────────────────────

async fn poll_connect<T>(pending: &mut Option<ConnectFuture<T>>) -> Result<T, ChatError> {
    match pending.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_from<T: Transport>(
    transport: &mut Option<T>,
) -> Option<Result<String, ChatError>> {
    match transport.as_mut() {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_on(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

// ── Event emission ──────────────────────────────────────────────────

/// Emit an event. If the channel is full, log a warning and drop the event
/// rather than stall the session task.
async fn emit_event(event_tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    if event.is_critical() {
        emit_critical(event_tx, event).await;
        return;
    }
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit an event that must not be dropped (`Failed`, `Left`).
async fn emit_critical(event_tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}
