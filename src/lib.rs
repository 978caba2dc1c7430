//! # QuickChat Client
//!
//! Session lifecycle manager for joining a realtime chat room.
//!
//! A [`ChatClient`] validates its configuration, connects through a
//! [`Connector`], negotiates a session (`validateUsername` → `joinRoom` →
//! `sessionEstablished`), keeps it alive with heartbeats, reconnects with
//! linear backoff, and tears everything down exactly once when the session
//! is kicked, fails, or is left.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketConnector`
//! - **Event-driven**: receive typed [`ChatEvent`]s via a channel
//! - **Every failure is actionable**: terminal outcomes carry a [`Failure`]
//!   with exactly one [`RecoveryAction`]
//! - **Navigation guard**: [`NavigationGuard`] confirms before a live session
//!   is left by accident
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn run() -> Result<(), quickchat_client::ChatError> {
//! use quickchat_client::{ChatClient, ChatConfig, ChatEvent, ChatIdentity, WebSocketConnector};
//!
//! let identity = ChatIdentity::new("alice", "42")?;
//! let config = ChatConfig::from_env();
//! let (mut client, mut events) = ChatClient::open(WebSocketConnector::new(), config, identity)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::SessionEstablished(_) => client.send_message("hi all")?,
//!         ChatEvent::Message(msg) => println!("{}: {}", msg.username, msg.text),
//!         ChatEvent::Failed(failure) => {
//!             eprintln!("{failure}");
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod config;
mod connection;
pub mod error;
pub mod event;
pub mod failure;
pub mod heartbeat;
pub mod identity;
pub mod navigation;
pub mod negotiator;
pub mod presence;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::ChatClient;
pub use config::{ChatConfig, TransportKind};
pub use error::ChatError;
pub use event::ChatEvent;
pub use failure::{Failure, FailureKind, RecoveryAction};
pub use identity::ChatIdentity;
pub use navigation::{NavigationDecision, NavigationEvent, NavigationGuard, Navigator};
pub use presence::RoomStats;
pub use protocol::{ChatMessage, ClientMessage, ServerMessage};
pub use state::{ConnectionState, Session};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
