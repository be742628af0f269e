mod firestore;
mod http;
mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{info, warn};

pub use firestore::FirestoreStore;
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::{
    config::{BackendKind, Config},
    db::{Message, NewMessage, NewTyping, TypingIndicator},
    error::{ChatError, ChatResult},
};

/// The five things a chat view needs from wherever messages live.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(&self, message: NewMessage) -> ChatResult<Message>;

    /// Newest `limit` messages of `room`, oldest first.
    async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>>;

    async fn touch(&self, typing: NewTyping) -> ChatResult<()>;

    /// Never fails because the indicator is missing.
    async fn clear(&self, room: &str, username: &str) -> ChatResult<()>;

    async fn list_active(&self, room: &str, now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>>;

    async fn close(&self) {}
}

pub type SharedStore = Arc<dyn ChatStore>;

#[async_trait]
impl<S: ChatStore + ?Sized> ChatStore for Arc<S> {
    async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        (**self).append(message).await
    }

    async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>> {
        (**self).list(room, limit).await
    }

    async fn touch(&self, typing: NewTyping) -> ChatResult<()> {
        (**self).touch(typing).await
    }

    async fn clear(&self, room: &str, username: &str) -> ChatResult<()> {
        (**self).clear(room, username).await
    }

    async fn list_active(&self, room: &str, now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>> {
        (**self).list_active(room, now).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

pub fn from_config(config: &Config) -> ChatResult<SharedStore> {
    let store: SharedStore = match config.backend {
        BackendKind::Sqlite => {
            let url = config
                .database_url
                .clone()
                .ok_or_else(|| ChatError::unavailable("DATABASE_URL is not set"))?;
            info!("Using sqlite store");
            Arc::new(SqliteStore::new(url, config.max_connections))
        }
        BackendKind::Firestore => {
            let firebase = config
                .firebase
                .clone()
                .ok_or_else(|| ChatError::unavailable("FIREBASE_PROJECT_ID is not set"))?;
            info!("Using firestore store for project {}", firebase.project_id);
            Arc::new(FirestoreStore::new(firebase)?)
        }
        BackendKind::Memory => {
            warn!("Using in-memory store, messages will not survive a restart");
            Arc::new(MemoryStore::default())
        }
    };

    Ok(store)
}
