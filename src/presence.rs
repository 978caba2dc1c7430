//! Server-pushed room presence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::protocol::RoomStatsPayload;

/// Latest room statistics as reported by the server.
///
/// `user_count` is taken verbatim; it is not reconciled with `active_users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStats {
    pub user_count: u32,
    pub active_users: BTreeSet<String>,
}

impl From<RoomStatsPayload> for RoomStats {
    fn from(payload: RoomStatsPayload) -> Self {
        Self {
            user_count: payload.user_count,
            active_users: payload.active_users.into_iter().collect(),
        }
    }
}

/// Holds the most recent [`RoomStats`]. Every push replaces the whole value.
#[derive(Debug, Clone, Default)]
pub struct RoomPresenceTracker {
    stats: RoomStats,
}

impl RoomPresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked state and return the new value.
    pub fn apply(&mut self, payload: RoomStatsPayload) -> &RoomStats {
        self.stats = RoomStats::from(payload);
        &self.stats
    }

    pub fn stats(&self) -> &RoomStats {
        &self.stats
    }

    pub fn is_active(&self, username: &str) -> bool {
        self.stats.active_users.contains(username)
    }
}
