//! Fatal outcomes surfaced to the user.
//!
//! Every terminal state of a chat session maps to a [`Failure`]: a
//! [`FailureKind`], the message shown to the user, and exactly one
//! [`RecoveryAction`]. Nothing that ends a session is reported without one.

use std::fmt;

/// Message used when the reconnect budget is exhausted.
pub const RECONNECT_EXHAUSTED_MESSAGE: &str = "unable to connect to server after multiple attempts";

/// Classification of a fatal session outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The server endpoint is missing. No connection was ever attempted.
    Configuration,
    /// The server rejected the username for this room.
    Validation,
    /// The connection could not be (re-)established within the retry budget.
    Transport,
    /// The server kicked this client or declared the session invalid.
    SessionTermination,
    /// The server reported an `error` event.
    Server,
}

/// The single action offered to the user after a fatal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Reload the chat view and run the whole lifecycle again.
    Reload,
    /// Return to the room/username entry point.
    NavigateHome,
}

impl FailureKind {
    /// Heading shown above the failure message.
    pub fn title(&self) -> &'static str {
        match self {
            Self::SessionTermination => "Session Terminated",
            _ => "Cannot Join Room",
        }
    }

    /// Returns a human-readable description of this failure kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => {
                "The chat server endpoint is not configured. No connection was attempted."
            }
            Self::Validation => {
                "The username is not available in this room. Choose a different username."
            }
            Self::Transport => {
                "The chat server could not be reached. Check your connection and try again."
            }
            Self::SessionTermination => {
                "This usually happens when the same username is used in another browser or device."
            }
            Self::Server => "The chat server reported an error while handling this session.",
        }
    }

    /// The recovery action offered for this kind.
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            Self::Transport | Self::Server => RecoveryAction::Reload,
            Self::Configuration | Self::Validation | Self::SessionTermination => {
                RecoveryAction::NavigateHome
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reload => f.write_str("Try Again"),
            Self::NavigateHome => f.write_str("Go Home"),
        }
    }
}

/// A fatal outcome together with the message surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure for an exhausted reconnect budget.
    pub fn reconnect_exhausted() -> Self {
        Self::new(FailureKind::Transport, RECONNECT_EXHAUSTED_MESSAGE)
    }

    /// Failure for a `sessionKicked` push.
    pub fn kicked(reason: &str) -> Self {
        Self::new(
            FailureKind::SessionTermination,
            format!("Session terminated: {reason}"),
        )
    }

    /// Failure for a `sessionInvalid` push.
    pub fn session_invalid() -> Self {
        Self::new(FailureKind::SessionTermination, "Session expired or invalid")
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    pub fn recovery(&self) -> RecoveryAction {
        self.kind.recovery()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FailureKind; 5] = [
        FailureKind::Configuration,
        FailureKind::Validation,
        FailureKind::Transport,
        FailureKind::SessionTermination,
        FailureKind::Server,
    ];

    #[test]
    fn every_kind_has_a_description() {
        for kind in ALL {
            assert!(!kind.description().is_empty(), "{kind:?}");
        }
    }

    #[test]
    fn only_evictions_are_titled_session_terminated() {
        for kind in ALL {
            let expected = if kind == FailureKind::SessionTermination {
                "Session Terminated"
            } else {
                "Cannot Join Room"
            };
            assert_eq!(kind.title(), expected);
        }
    }

    #[test]
    fn evicted_sessions_cannot_be_retried() {
        assert_eq!(
            FailureKind::SessionTermination.recovery(),
            RecoveryAction::NavigateHome
        );
        assert_eq!(FailureKind::Transport.recovery(), RecoveryAction::Reload);
    }

    #[test]
    fn reconnect_exhausted_mentions_unable_to_connect() {
        let failure = Failure::reconnect_exhausted();
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.message.contains("unable to connect"));
    }

    #[test]
    fn kicked_failure_carries_reason() {
        let failure = Failure::kicked("duplicate login");
        assert_eq!(failure.message, "Session terminated: duplicate login");
        assert_eq!(
            failure.to_string(),
            "Session Terminated: Session terminated: duplicate login"
        );
    }
}
