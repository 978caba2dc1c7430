//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable read by [`ChatConfig::from_env`].
pub const SERVER_URL_ENV: &str = "QUICKCHAT_SERVER_URL";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_RECONNECT_STEP: Duration = Duration::from_secs(2);
const DEFAULT_LEAVE_GRACE: Duration = Duration::from_millis(100);

/// Low-level transports a connector may use, in preference order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent WebSocket connection.
    Websocket,
    /// HTTP long-polling fallback.
    Polling,
}

/// Configuration for a [`ChatClient`](crate::client::ChatClient) session.
///
/// The only required field is `server_url`; everything else has defaults
/// matching the QuickChat server's expectations.
///
/// # Example
///
/// ```
/// use quickchat_client::config::ChatConfig;
/// use std::time::Duration;
///
/// let config = ChatConfig::new("ws://localhost:3000/ws")
///     .with_heartbeat_interval(Duration::from_secs(10))
///     .with_max_reconnect_attempts(5);
/// assert_eq!(config.server_url.as_deref(), Some("ws://localhost:3000/ws"));
/// assert_eq!(config.max_reconnect_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Server endpoint. `None` or blank makes `open` fail with a configuration error.
    pub server_url: Option<String>,
    /// Transport preference list handed to the connector.
    pub transports: Vec<TransportKind>,
    /// Upper bound for a single low-level connect.
    ///
    /// Defaults to **20 seconds**.
    pub connect_timeout: Duration,
    /// Interval between heartbeats while a session is established.
    ///
    /// Defaults to **30 seconds**.
    pub heartbeat_interval: Duration,
    /// Reconnect attempts allowed after an unintentional disconnect.
    ///
    /// Defaults to **3**.
    pub max_reconnect_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * reconnect_step`.
    ///
    /// Defaults to **2 seconds**.
    pub reconnect_step: Duration,
    /// Delay between the leave emission and navigating to the entry point.
    ///
    /// Defaults to **100 ms**.
    pub leave_grace: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, non-terminal events are dropped
    /// (with a warning logged) to avoid stalling the session task.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the session task
    /// immediately.
    pub shutdown_timeout: Duration,
}

impl ChatConfig {
    /// Create a configuration for the given server endpoint with default values.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            ..Self::unconfigured()
        }
    }

    /// Create a configuration from [`SERVER_URL_ENV`].
    ///
    /// A missing variable is not an error here; the resulting config has no
    /// server URL and [`ChatClient::open`](crate::client::ChatClient::open)
    /// reports it.
    pub fn from_env() -> Self {
        match std::env::var(SERVER_URL_ENV) {
            Ok(url) => Self::new(url),
            Err(_) => Self::unconfigured(),
        }
    }

    fn unconfigured() -> Self {
        Self {
            server_url: None,
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_step: DEFAULT_RECONNECT_STEP,
            leave_grace: DEFAULT_LEAVE_GRACE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// The configured server URL, if present and non-blank.
    pub fn endpoint(&self) -> Option<&str> {
        self.server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Set the transport preference list. An empty list is ignored.
    #[must_use]
    pub fn with_transports(mut self, transports: Vec<TransportKind>) -> Self {
        if !transports.is_empty() {
            self.transports = transports;
        }
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the heartbeat interval. Zero is clamped to 1 ms (tokio panics on a
    /// zero-period interval).
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    #[must_use]
    pub fn with_reconnect_step(mut self, step: Duration) -> Self {
        self.reconnect_step = step;
        self
    }

    #[must_use]
    pub fn with_leave_grace(mut self, grace: Duration) -> Self {
        self.leave_grace = grace;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
