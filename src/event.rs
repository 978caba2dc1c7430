//! Events delivered from the session task to the host.

use std::time::Duration;

use uuid::Uuid;

use crate::failure::Failure;
use crate::presence::RoomStats;
use crate::protocol::ChatMessage;
use crate::state::{ConnectionState, Session};

/// Something the host should react to (render, log, navigate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The connection state machine moved to a new state.
    StateChanged(ConnectionState),
    /// A low-level connection opened. Each transport lifetime gets a fresh id.
    Connected { connection_id: Uuid },
    /// The handshake completed and a session token was issued.
    SessionEstablished(Session),
    /// A chat message arrived and was appended to the log.
    Message(ChatMessage),
    /// Room presence was replaced.
    RoomStats(RoomStats),
    /// The server acknowledged a heartbeat.
    HeartbeatAck,
    /// A reconnect is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The transport dropped. `reason` is `None` on a clean server close.
    Disconnected { reason: Option<String> },
    /// The session ended fatally. Always the last event before `Left` or
    /// channel close.
    Failed(Failure),
    /// The leave sequence finished; the session task has exited.
    Left,
}

impl ChatEvent {
    /// Events that must reach the host even when the channel is full.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Left)
    }
}
