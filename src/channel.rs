//! Chat message send/receive over an established session.

use crate::error::{ChatError, Result};
use crate::protocol::{now_ms, ChatMessage, ClientMessage};
use crate::state::Session;

/// Outbound message construction plus the inbound, append-only message log.
///
/// The log keeps arrival order. It does not sort by timestamp, deduplicate,
/// or cap its length.
#[derive(Debug, Clone, Default)]
pub struct MessageChannel {
    log: Vec<ChatMessage>,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the `chatMessage` frame for `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyMessage`] if `text` is blank, or
    /// [`ChatError::NotEstablished`] if there is no session.
    pub fn compose(text: &str, session: Option<&Session>) -> Result<ClientMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let session = session.ok_or(ChatError::NotEstablished)?;
        Ok(ClientMessage::ChatMessage {
            username: session.username.clone(),
            text: text.to_owned(),
            timestamp: now_ms(),
            room_id: session.room_id.clone(),
        })
    }

    /// Append an inbound message.
    pub fn receive(&mut self, message: ChatMessage) {
        self.log.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}
