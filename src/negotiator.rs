//! The validate → join handshake.
//!
//! [`SessionNegotiator`] only tracks where the handshake stands and builds the
//! frames to send; the connection manager does the I/O. A handshake never
//! resumes halfway: [`reset`](SessionNegotiator::reset) discards everything
//! and the next connection starts over from `validateUsername`.

use tracing::{debug, warn};

use crate::identity::ChatIdentity;
use crate::protocol::{now_ms, ClientMessage};
use crate::state::Session;

/// Where the handshake stands on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// No handshake on this connection.
    Idle,
    /// `validateUsername` sent, waiting for `usernameValidation`.
    AwaitingValidation,
    /// `joinRoom` sent, waiting for `sessionEstablished`.
    AwaitingSession,
}

/// Result of feeding a `usernameValidation` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Username accepted; send this `joinRoom`.
    Join(ClientMessage),
    /// Username refused. The handshake is over for this attempt.
    Rejected(String),
    /// No validation was pending; the response is stale.
    Ignored,
}

/// Result of feeding a `sessionEstablished` push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstablishOutcome {
    Established(Session),
    /// Issued for a different `(username, roomId)` than the pending join.
    /// The handshake cannot complete on this connection.
    Mismatched { username: String, room_id: String },
    /// Not preceded by an accepted validation and a join on this connection.
    Ignored,
}

/// Drives the handshake for one identity.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    identity: ChatIdentity,
    phase: HandshakePhase,
}

impl SessionNegotiator {
    pub fn new(identity: ChatIdentity) -> Self {
        Self {
            identity,
            phase: HandshakePhase::Idle,
        }
    }

    pub fn identity(&self) -> &ChatIdentity {
        &self.identity
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Start a fresh handshake and return the `validateUsername` frame.
    pub fn begin(&mut self) -> ClientMessage {
        if self.phase != HandshakePhase::Idle {
            debug!(phase = ?self.phase, "discarding in-flight handshake");
        }
        self.phase = HandshakePhase::AwaitingValidation;
        ClientMessage::ValidateUsername {
            username: self.identity.username().to_owned(),
            room_id: self.identity.room_id(),
        }
    }

    pub fn on_validation(&mut self, valid: bool, error: Option<String>) -> ValidationOutcome {
        if self.phase != HandshakePhase::AwaitingValidation {
            warn!(phase = ?self.phase, "ignoring usernameValidation outside of validation");
            return ValidationOutcome::Ignored;
        }
        if valid {
            self.phase = HandshakePhase::AwaitingSession;
            ValidationOutcome::Join(ClientMessage::JoinRoom {
                username: self.identity.username().to_owned(),
                room_id: self.identity.room_id(),
            })
        } else {
            self.phase = HandshakePhase::Idle;
            ValidationOutcome::Rejected(
                error.unwrap_or_else(|| "Username validation failed".to_owned()),
            )
        }
    }

    pub fn on_established(
        &mut self,
        session_id: String,
        username: &str,
        room_id: &str,
    ) -> EstablishOutcome {
        if self.phase != HandshakePhase::AwaitingSession {
            warn!(phase = ?self.phase, "ignoring sessionEstablished without a pending join");
            return EstablishOutcome::Ignored;
        }
        if !self.identity.matches(username, room_id) {
            warn!(username, room_id, "sessionEstablished for a different identity");
            self.phase = HandshakePhase::Idle;
            return EstablishOutcome::Mismatched {
                username: username.to_owned(),
                room_id: room_id.to_owned(),
            };
        }
        self.phase = HandshakePhase::Idle;
        EstablishOutcome::Established(Session {
            session_id,
            username: self.identity.username().to_owned(),
            room_id: self.identity.room_id(),
            established_at: now_ms(),
        })
    }

    /// Drop all in-flight handshake state.
    pub fn reset(&mut self) {
        self.phase = HandshakePhase::Idle;
    }
}
