//! Wire-compatible protocol types for the QuickChat realtime protocol.
//!
//! Every frame is a JSON object `{"type": <event name>, "data": <payload>}`.
//! Event names and payload fields are camelCase, matching the server's
//! event names (`validateUsername`, `sessionEstablished`, ...). Events
//! without a payload omit `data`.
//!
//! Timestamps are milliseconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

// ── Payload structs ─────────────────────────────────────────────────

/// A chat message as broadcast by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    pub timestamp: u64,
}

/// Room statistics pushed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatsPayload {
    pub user_count: u32,
    #[serde(default)]
    pub active_users: Vec<String>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Ask whether `username` is free in `room_id`. Always the first event of
    /// a fresh handshake.
    ValidateUsername { username: String, room_id: String },
    /// Join the room after a positive validation.
    JoinRoom { username: String, room_id: String },
    /// Liveness signal carrying the current session token.
    Heartbeat {
        username: String,
        room_id: String,
        session_id: String,
    },
    /// Post a chat message to the room.
    ChatMessage {
        username: String,
        text: String,
        timestamp: u64,
        room_id: String,
    },
    /// Orderly departure from the room.
    LeaveRoom { username: String, room_id: String },
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Answer to `validateUsername`.
    UsernameValidation {
        valid: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The join succeeded and the server issued a session token.
    SessionEstablished {
        session_id: String,
        username: String,
        room_id: String,
    },
    /// The server evicted this session (e.g. the username logged in elsewhere).
    SessionKicked { reason: String, timestamp: u64 },
    /// The session token presented by this client is unknown or expired.
    SessionInvalid,
    /// Acknowledgement of a heartbeat.
    HeartbeatAck,
    /// A chat message broadcast to the room.
    Message(ChatMessage),
    /// Full replacement of the room's presence statistics.
    RoomStats(RoomStatsPayload),
    /// Server-side failure.
    Error { message: String },
}

impl ServerMessage {
    /// Wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UsernameValidation { .. } => "usernameValidation",
            Self::SessionEstablished { .. } => "sessionEstablished",
            Self::SessionKicked { .. } => "sessionKicked",
            Self::SessionInvalid => "sessionInvalid",
            Self::HeartbeatAck => "heartbeatAck",
            Self::Message(_) => "message",
            Self::RoomStats(_) => "roomStats",
            Self::Error { .. } => "error",
        }
    }
}

impl ClientMessage {
    /// Wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ValidateUsername { .. } => "validateUsername",
            Self::JoinRoom { .. } => "joinRoom",
            Self::Heartbeat { .. } => "heartbeat",
            Self::ChatMessage { .. } => "chatMessage",
            Self::LeaveRoom { .. } => "leaveRoom",
        }
    }
}
