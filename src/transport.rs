//! Transport abstraction for the QuickChat protocol.
//!
//! The [`Transport`] trait defines a bidirectional text frame channel between
//! the client and server. Every frame is one JSON-encoded protocol event, so a
//! transport handles framing internally (WebSocket frames, length-prefixed
//! TCP, in-process channels in tests).
//!
//! # Connection Setup
//!
//! Unlike a one-shot client, the session manager must be able to open a *new*
//! connection after a drop. That is the job of [`Connector`]: it turns a
//! server URL and a transport preference list into a connected [`Transport`].
//! The session manager owns exactly one connector and at most one live
//! transport at any time.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quickchat_client::config::TransportKind;
//! use quickchat_client::error::ChatError;
//! use quickchat_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ChatError> {
//!         // Send the JSON text frame over your transport
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ChatError>> {
//!         // Receive the next JSON text frame; `None` on clean close
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ChatError> {
//!         unimplemented!()
//!     }
//! }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(
//!         &self,
//!         url: &str,
//!         preference: &[TransportKind],
//!     ) -> Result<MyTransport, ChatError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::config::TransportKind;
use crate::error::ChatError;

/// A bidirectional text frame transport for the QuickChat protocol.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame.
/// Each call to [`recv`](Transport::recv) returns one complete JSON frame.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), ChatError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, ChatError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// Opens new [`Transport`]s.
///
/// Called once by `ChatClient::open` and again for every scheduled reconnect.
/// The session manager bounds each call with the configured connect timeout
/// and drops the future if the session ends while a connect is in flight.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Connect to `url`, trying transports in `preference` order.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnsupportedTransport`] if no preferred kind is
    /// supported, or any connect error of the underlying transport.
    async fn connect(
        &self,
        url: &str,
        preference: &[TransportKind],
    ) -> Result<Self::Transport, ChatError>;
}
