//! QuickChat over WebSocket, using `tokio-tungstenite`.
//!
//! One protocol event per text message. The chat server is usually
//! configured with its HTTP origin (`https://chat.example.com`), so
//! [`socket_url`] maps `http`/`https` onto `ws`/`wss` before dialing.
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quickchat_client::ChatError> {
//! use quickchat_client::config::TransportKind;
//! use quickchat_client::{Connector, Transport, WebSocketConnector};
//!
//! let mut transport = WebSocketConnector::new()
//!     .connect("http://localhost:3001", &[TransportKind::Websocket])
//!     .await?;
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("server pushed: {frame}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, info, warn};

use crate::config::TransportKind;
use crate::error::ChatError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream, public so callers can build a
/// [`WebSocketTransport`] via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Rewrite a chat server URL into the WebSocket URL to dial.
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss` pass through.
///
/// # Errors
///
/// Returns [`ChatError::Connect`] for any other scheme.
pub fn socket_url(server_url: &str) -> Result<String, ChatError> {
    let trimmed = server_url.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(ChatError::Connect(format!("{trimmed:?} has no scheme")));
    };
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(ChatError::Connect(format!(
                "unsupported scheme {other:?} for a chat server"
            )))
        }
    };
    Ok(format!("{scheme}://{rest}"))
}

/// A [`Transport`] carrying QuickChat frames as WebSocket text messages.
///
/// [`recv`](Transport::recv) is cancel-safe. A normal close from the server
/// ends the stream with `None`; any other close code surfaces as an error
/// carrying the code and reason, so reconnect logs say why the room dropped.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dial `server_url` (after [`socket_url`] normalization).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Connect`] if the URL is unusable or the handshake
    /// fails.
    pub async fn connect(server_url: &str) -> Result<Self, ChatError> {
        let url = socket_url(server_url)?;
        debug!(%url, "dialing chat server");

        let (stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChatError::Connect(format!("{url}: {e}")))?;

        info!(%url, status = response.status().as_u16(), "chat socket open");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

fn close_reason(frame: Option<CloseFrame>) -> Option<ChatError> {
    let frame = frame?;
    match frame.code {
        CloseCode::Normal | CloseCode::Away => None,
        code => Some(ChatError::TransportReceive(format!(
            "server closed the room socket ({code}): {}",
            frame.reason
        ))),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        if self.closed {
            return Err(ChatError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        while let Some(next) = self.stream.next().await {
            match next {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                // Some proxies re-frame text as binary.
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!(len = bytes.len(), "skipping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "chat socket closed by server");
                    self.closed = true;
                    return close_reason(frame).map(Err);
                }
                // tungstenite answers pings itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(ChatError::TransportReceive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }
}

/// A [`Connector`] that opens a fresh [`WebSocketTransport`] per attempt.
///
/// Only [`TransportKind::Websocket`] is supported; a preference list without
/// it is refused with [`ChatError::UnsupportedTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(
        &self,
        url: &str,
        preference: &[TransportKind],
    ) -> Result<WebSocketTransport, ChatError> {
        if !preference.contains(&TransportKind::Websocket) {
            return Err(ChatError::UnsupportedTransport);
        }
        WebSocketTransport::connect(url).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Serve one connection with `room` and return the server's HTTP URL.
    async fn chat_server<F, Fut>(room: F) -> String
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            room(ws).await;
        });

        format!("http://{addr}")
    }

    #[test]
    fn socket_url_maps_http_schemes() {
        assert_eq!(
            socket_url("http://chat.test:3001").unwrap(),
            "ws://chat.test:3001"
        );
        assert_eq!(
            socket_url(" HTTPS://chat.test/rooms ").unwrap(),
            "wss://chat.test/rooms"
        );
        assert_eq!(socket_url("wss://chat.test").unwrap(), "wss://chat.test");
    }

    #[test]
    fn socket_url_rejects_other_schemes() {
        assert!(matches!(
            socket_url("ftp://chat.test"),
            Err(ChatError::Connect(_))
        ));
        assert!(matches!(socket_url("chat.test"), Err(ChatError::Connect(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WebSocketTransport::connect(&format!("ws://{addr}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Connect(_)), "{err:?}");
    }

    #[tokio::test]
    async fn recv_accepts_text_and_utf8_binary() {
        let url = chat_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xff, 0xfe].into())).await.unwrap();
            ws.send(Message::Binary(br#"{"type":"sessionInvalid"}"#.to_vec().into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"heartbeatAck"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"sessionInvalid"}"#
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"heartbeatAck"}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn abnormal_close_surfaces_as_error() {
        let url = chat_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "room closed".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        match transport.recv().await {
            Some(Err(ChatError::TransportReceive(reason))) => {
                assert!(reason.contains("room closed"), "{reason}");
            }
            other => panic!("expected a receive error, got {other:?}"),
        }
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, ChatError::TransportClosed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let url = chat_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, ChatError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_carries_a_chat_frame_both_ways() {
        let url = chat_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let frame = r#"{"type":"leaveRoom","data":{"username":"alice","roomId":"42"}}"#;
        let mut transport = WebSocketConnector::new()
            .connect(&url, &[TransportKind::Polling, TransportKind::Websocket])
            .await
            .unwrap();
        transport.send(frame.into()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), frame);
    }

    #[tokio::test]
    async fn connector_refuses_polling_only_preference() {
        let err = WebSocketConnector::new()
            .connect("ws://127.0.0.1:1", &[TransportKind::Polling])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UnsupportedTransport));
    }
}
