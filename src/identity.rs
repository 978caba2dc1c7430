//! Username and room id checks at the trust boundary.
//!
//! Both values come from user input or the URL, so they are re-checked here
//! even if the entry form already validated them.

use std::fmt;

use crate::error::{ChatError, Result};

/// Minimum username length, in characters, after trimming.
pub const USERNAME_MIN_CHARS: usize = 3;
/// Maximum username length, in characters, after trimming.
pub const USERNAME_MAX_CHARS: usize = 20;
/// Lowest accepted room number.
pub const ROOM_MIN: u16 = 1;
/// Highest accepted room number.
pub const ROOM_MAX: u16 = 9999;

/// A validated `(username, room)` pair.
///
/// ```
/// use quickchat_client::identity::ChatIdentity;
///
/// let id = ChatIdentity::new("  alice ", "42").unwrap();
/// assert_eq!(id.username(), "alice");
/// assert_eq!(id.room_id(), "42");
/// assert!(ChatIdentity::new("al", "42").is_err());
/// assert!(ChatIdentity::new("alice", "10000").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatIdentity {
    username: String,
    room: u16,
}

impl ChatIdentity {
    /// Validate raw inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidUsername`] if the trimmed username is not
    /// 3 to 20 characters, or [`ChatError::InvalidRoom`] if `room_id` is not
    /// an integer in 1 to 9999.
    pub fn new(username: &str, room_id: &str) -> Result<Self> {
        let username = validate_username(username)?;
        let room = validate_room(room_id)?;
        Ok(Self { username, room })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room(&self) -> u16 {
        self.room
    }

    /// Room id in its wire form.
    pub fn room_id(&self) -> String {
        self.room.to_string()
    }

    /// Whether a server-echoed `(username, roomId)` refers to this identity.
    pub fn matches(&self, username: &str, room_id: &str) -> bool {
        self.username == username && validate_room(room_id).ok() == Some(self.room)
    }
}

impl fmt::Display for ChatIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@#{}", self.username, self.room)
    }
}

fn validate_username(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidUsername("username is empty".into()));
    }
    let len = trimmed.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(ChatError::InvalidUsername(format!(
            "username must be between {USERNAME_MIN_CHARS} and {USERNAME_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

fn validate_room(raw: &str) -> Result<u16> {
    let room: u16 = raw
        .trim()
        .parse()
        .map_err(|_| ChatError::InvalidRoom(format!("{raw:?} is not a room number")))?;
    if !(ROOM_MIN..=ROOM_MAX).contains(&room) {
        return Err(ChatError::InvalidRoom(format!(
            "room must be between {ROOM_MIN} and {ROOM_MAX}"
        )));
    }
    Ok(room)
}
