//! Session state: the connection state machine, the session record, and the
//! reconnect policy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a chat connection. Exactly one value holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing opened yet.
    Idle,
    /// A low-level connect is in flight.
    Connecting,
    /// Connected; the validate → join handshake is running.
    Validating,
    /// A session token has been issued.
    Established,
    /// The transport is gone and no retry is scheduled (after leave).
    Disconnected,
    /// Waiting out the backoff delay before the next connect.
    Reconnecting,
    /// Evicted by the server. Terminal.
    Kicked,
    /// Fatal failure. Terminal.
    Error,
}

impl ConnectionState {
    /// `Kicked` and `Error` have no way back short of a new client.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Kicked | Self::Error)
    }

    pub fn is_established(self) -> bool {
        self == Self::Established
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Validating => "validating",
            Self::Established => "established",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Kicked => "kicked",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-issued session for one participant in one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque token issued by the server.
    pub session_id: String,
    pub username: String,
    pub room_id: String,
    /// Milliseconds since the Unix epoch.
    pub established_at: u64,
}

impl Session {
    /// First six characters of the token, for status lines.
    pub fn short_id(&self) -> &str {
        self.session_id
            .char_indices()
            .nth(6)
            .and_then(|(idx, _)| self.session_id.get(..idx))
            .unwrap_or(&self.session_id)
    }
}

/// Bounded linear backoff for reconnects.
///
/// Attempt `n` (1-based) waits `n * step`. Once `max` attempts have been
/// spent the policy refuses further retries until [`reset`](Self::reset).
///
/// ```
/// use quickchat_client::state::ReconnectPolicy;
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(3, Duration::from_secs(2));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(6)));
/// assert_eq!(policy.next_delay(), None);
/// policy.reset();
/// assert_eq!(policy.attempts(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempts: u32,
    max: u32,
    step: Duration,
}

impl ReconnectPolicy {
    pub fn new(max: u32, step: Duration) -> Self {
        Self {
            attempts: 0,
            max,
            step,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Delay for a given attempt number.
    pub fn delay(&self, attempts: u32) -> Duration {
        self.step.saturating_mul(attempts)
    }

    /// Spend one attempt and return its delay, or `None` when the budget is
    /// exhausted. `attempts` never exceeds `max`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max {
            return None;
        }
        self.attempts += 1;
        Some(self.delay(self.attempts))
    }

    /// Called on every successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
