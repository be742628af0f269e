use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ChatError, ChatResult};

pub const DEFAULT_ROOM: &str = "lobby";
pub const ROOM_PRESETS: [&str; 4] = ["lobby", "bnb", "usa", "dev"];

pub const MAX_MESSAGE_CHARS: usize = 1000;
pub const TYPING_WINDOW: Duration = Duration::seconds(10);

/// A chat message as stored and served.
///
/// `created_at` only drives display order; within a room messages are listed
/// in non-decreasing `created_at` order. Messages are never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room: String,
    pub username: String,
    pub user_color: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A message that passed validation and has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    room: String,
    username: String,
    user_color: String,
    text: String,
}

impl NewMessage {
    pub fn new(
        room: impl Into<String>,
        username: impl Into<String>,
        user_color: impl Into<String>,
        text: impl Into<String>,
    ) -> ChatResult<Self> {
        let (username, user_color, text) = (username.into(), user_color.into(), text.into());

        if username.is_empty() || user_color.is_empty() || text.is_empty() {
            return Err(ChatError::validation("Missing required fields"));
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::validation("Message too long"));
        }

        Ok(Self {
            room: room_or_default(room.into()),
            username,
            user_color,
            text,
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn user_color(&self) -> &str {
        &self.user_color
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_message(self, id: String, created_at: OffsetDateTime) -> Message {
        Message {
            id,
            room: self.room,
            username: self.username,
            user_color: self.user_color,
            text: self.text,
            created_at,
        }
    }
}

/// Ephemeral "is typing" presence, one per `(room, username)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub room: String,
    pub username: String,
    pub user_color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TypingIndicator {
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        now - self.updated_at < TYPING_WINDOW
    }
}

/// Validated key and colour for a typing upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTyping {
    room: String,
    username: String,
    user_color: String,
}

impl NewTyping {
    pub fn new(
        room: impl Into<String>,
        username: impl Into<String>,
        user_color: impl Into<String>,
    ) -> ChatResult<Self> {
        let (room, username, user_color) = (room.into(), username.into(), user_color.into());
        if room.is_empty() || username.is_empty() || user_color.is_empty() {
            return Err(ChatError::validation("Missing required fields"));
        }

        Ok(Self { room, username, user_color })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn user_color(&self) -> &str {
        &self.user_color
    }

    pub fn at(self, updated_at: OffsetDateTime) -> TypingIndicator {
        TypingIndicator {
            room: self.room,
            username: self.username,
            user_color: self.user_color,
            updated_at,
        }
    }
}

pub fn room_or_default(room: String) -> String {
    if room.is_empty() {
        DEFAULT_ROOM.to_owned()
    } else {
        room
    }
}

pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> ChatResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)?)
}
