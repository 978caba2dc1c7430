//! # Loopback Session Example
//!
//! Runs a complete session against an in-process fake server, no network
//! needed. Shows how to plug a custom [`Connector`] and [`Transport`] into
//! the client:
//!
//! - the fake server validates the username and issues a session
//! - it echoes every chat message back as a room broadcast
//! - it kicks the session after the third message
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=quickchat_client=debug cargo run --example loopback_session
//! ```

use async_trait::async_trait;
use quickchat_client::protocol::{ChatMessage, ClientMessage, RoomStatsPayload, ServerMessage};
use quickchat_client::{
    ChatClient, ChatConfig, ChatError, ChatEvent, ChatIdentity, Connector, Transport,
    TransportKind,
};
use tokio::sync::mpsc;

/// Client side of an in-process channel pair.
struct LoopbackTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        self.to_server
            .send(message)
            .map_err(|_| ChatError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        // `UnboundedReceiver::recv` is cancel-safe.
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.from_server.close();
        Ok(())
    }
}

/// Spawns a fresh fake server for every connect.
struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(
        &self,
        url: &str,
        _preference: &[TransportKind],
    ) -> Result<LoopbackTransport, ChatError> {
        tracing::info!(url, "starting loopback server");
        let (to_server, inbox) = mpsc::unbounded_channel();
        let (outbox, from_server) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(inbox, outbox));
        Ok(LoopbackTransport {
            to_server,
            from_server,
        })
    }
}

async fn fake_server(
    mut inbox: mpsc::UnboundedReceiver<String>,
    outbox: mpsc::UnboundedSender<String>,
) {
    let push = |msg: ServerMessage| {
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = outbox.send(json);
        }
    };
    let mut posted = 0;

    while let Some(raw) = inbox.recv().await {
        let Ok(msg) = serde_json::from_str::<ClientMessage>(&raw) else {
            continue;
        };
        match msg {
            ClientMessage::ValidateUsername { .. } => push(ServerMessage::UsernameValidation {
                valid: true,
                error: None,
            }),
            ClientMessage::JoinRoom { username, room_id } => {
                push(ServerMessage::SessionEstablished {
                    session_id: uuid::Uuid::new_v4().simple().to_string(),
                    username: username.clone(),
                    room_id,
                });
                push(ServerMessage::RoomStats(RoomStatsPayload {
                    user_count: 1,
                    active_users: vec![username],
                }));
            }
            ClientMessage::Heartbeat { .. } => push(ServerMessage::HeartbeatAck),
            ClientMessage::ChatMessage {
                username,
                text,
                timestamp,
                ..
            } => {
                push(ServerMessage::Message(ChatMessage {
                    username,
                    text,
                    timestamp,
                }));
                posted += 1;
                if posted == 3 {
                    push(ServerMessage::SessionKicked {
                        reason: "demo over".into(),
                        timestamp,
                    });
                }
            }
            ClientMessage::LeaveRoom { .. } => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let identity = ChatIdentity::new("loopback", "7")?;
    let config = ChatConfig::new("loopback://demo");
    let (mut client, mut events) = ChatClient::open(LoopbackConnector, config, identity)?;

    let script = ["hello", "is anyone here?", "guess not"];
    let mut next = script.iter();

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::StateChanged(state) => tracing::info!("state → {state}"),
            ChatEvent::SessionEstablished(_) | ChatEvent::Message(_) => {
                if let ChatEvent::Message(msg) = &event {
                    println!("<{}> {}", msg.username, msg.text);
                }
                if let Some(text) = next.next() {
                    client.send_message(text)?;
                }
            }
            ChatEvent::Failed(failure) => {
                println!("{failure} [{}]", failure.recovery());
                break;
            }
            _ => {}
        }
    }

    println!("{} message(s) in the log", client.messages().await.len());
    client.shutdown().await;
    Ok(())
}
