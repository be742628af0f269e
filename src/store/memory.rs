use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    db::{Message, NewMessage, NewTyping, TypingIndicator},
    error::ChatResult,
};

use super::ChatStore;

/// Process-local store. Everything is gone when it is dropped.
#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<String, Vec<Message>>>,
    typing: Mutex<HashMap<(String, String), TypingIndicator>>,
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(message.room().to_owned()).or_default();

        let mut created_at = OffsetDateTime::now_utc();
        if let Some(last) = room.last() {
            created_at = created_at.max(last.created_at);
        }

        let message = message.into_message(Uuid::now_v7().to_string(), created_at);
        room.push(message.clone());
        Ok(message)
    }

    async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>> {
        let rooms = self.rooms.lock().await;
        let Some(messages) = rooms.get(room) else {
            return Ok(Vec::new());
        };

        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages[skip..].to_vec())
    }

    async fn touch(&self, typing: NewTyping) -> ChatResult<()> {
        let key = (typing.room().to_owned(), typing.username().to_owned());
        self.typing
            .lock()
            .await
            .insert(key, typing.at(OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn clear(&self, room: &str, username: &str) -> ChatResult<()> {
        self.typing
            .lock()
            .await
            .remove(&(room.to_owned(), username.to_owned()));
        Ok(())
    }

    async fn list_active(&self, room: &str, now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>> {
        let mut active: Vec<_> = self
            .typing
            .lock()
            .await
            .values()
            .filter(|indicator| indicator.room == room && indicator.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(active)
    }
}
