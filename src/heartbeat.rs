//! Periodic liveness signal for an established session.
//!
//! The monitor is polled from the session task's `select!` loop. Cancelling it
//! drops the interval, so a tick that was already due can never fire
//! afterwards. There is no ack timeout: `heartbeatAck` is accepted and
//! otherwise ignored.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::protocol::ClientMessage;
use crate::state::Session;

/// Cancellable heartbeat interval.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    interval: Option<Interval>,
}

impl HeartbeatMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// (Re)start the interval. The first tick is one full period away.
    pub fn start(&mut self) {
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        debug!(period_ms = self.period.as_millis() as u64, "heartbeat started");
    }

    pub fn cancel(&mut self) {
        if self.interval.take().is_some() {
            debug!("heartbeat cancelled");
        }
    }

    /// Resolves at the next tick. Pends forever while cancelled.
    ///
    /// Cancel-safe: dropping the future loses no tick.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// The heartbeat frame for a session.
    pub fn frame(session: &Session) -> ClientMessage {
        ClientMessage::Heartbeat {
            username: session.username.clone(),
            room_id: session.room_id.clone(),
            session_id: session.session_id.clone(),
        }
    }
}
