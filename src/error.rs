//! Error types for the QuickChat client.

use thiserror::Error;

use crate::failure::{Failure, FailureKind};

/// Errors that can occur when using the QuickChat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Required configuration is missing or blank. No connection is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The username failed the length check at the trust boundary.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// The room id is not an integer in the accepted range.
    #[error("invalid room id: {0}")]
    InvalidRoom(String),

    /// A chat message was empty after trimming.
    #[error("message text is empty")]
    EmptyMessage,

    /// Attempted an operation that requires an established session.
    #[error("no established session")]
    NotEstablished,

    /// The session task has exited; the handle is no longer usable.
    #[error("not connected to server")]
    NotConnected,

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// A connect attempt failed: bad server URL, refused or failed handshake.
    ///
    /// [`Connector`](crate::transport::Connector) implementations return this
    /// for any failure to reach the server. The session counts it against the
    /// reconnect budget.
    #[error("connect error: {0}")]
    Connect(String),

    /// None of the preferred transports is supported by the connector.
    #[error("no supported transport in preference list")]
    UnsupportedTransport,

    /// Failed to serialize or deserialize a protocol frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error inside a custom transport, via `?`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// The user-facing failure for errors that end a session before it starts.
    ///
    /// Returns `None` for errors the caller can retry or ignore.
    pub fn as_failure(&self) -> Option<Failure> {
        match self {
            Self::Configuration(detail) => Some(Failure::new(
                FailureKind::Configuration,
                format!("Chat server is not configured: {detail}"),
            )),
            Self::InvalidUsername(detail) | Self::InvalidRoom(detail) => {
                Some(Failure::new(FailureKind::Validation, detail.clone()))
            }
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for QuickChat client operations.
pub type Result<T> = std::result::Result<T, ChatError>;
