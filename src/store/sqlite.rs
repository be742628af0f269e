use std::{str::FromStr, time::Instant};

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::{Message, NewMessage, NewTyping, TYPING_WINDOW, TypingIndicator, from_millis, to_millis},
    error::ChatResult,
};

use super::ChatStore;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        room TEXT NOT NULL,
        username TEXT NOT NULL,
        user_color TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_room_created_at ON messages (room, created_at)",
    "CREATE TABLE IF NOT EXISTS typing_indicators (
        room TEXT NOT NULL,
        username TEXT NOT NULL,
        user_color TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (room, username)
    )",
];

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    room: String,
    username: String,
    user_color: String,
    message: String,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = crate::error::ChatError;

    fn try_from(row: MessageRow) -> ChatResult<Self> {
        Ok(Message {
            id: row.id,
            room: row.room,
            username: row.username,
            user_color: row.user_color,
            text: row.message,
            created_at: from_millis(row.created_at)?,
        })
    }
}

/// Relational store. The pool is opened on first use and closed by
/// [`ChatStore::close`]; concurrent first calls share one initialisation.
pub struct SqliteStore {
    url: String,
    max_connections: u32,
    pool: OnceCell<SqlitePool>,
}

impl SqliteStore {
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> ChatResult<&SqlitePool> {
        self.pool.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> ChatResult<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.url)?.create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(self.max_connections);
        if self.url.contains(":memory:") {
            // each connection would get its own empty database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("Connected to {}", self.url);
        Ok(pool)
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        let start = Instant::now();
        let row: MessageRow = sqlx::query_as(
            "INSERT INTO messages (id, room, username, user_color, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5,
                MAX(?6, COALESCE((SELECT MAX(created_at) FROM messages WHERE room = ?2), 0)))
             RETURNING id, room, username, user_color, message, created_at",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(message.room())
        .bind(message.username())
        .bind(message.user_color())
        .bind(message.text())
        .bind(to_millis(OffsetDateTime::now_utc()))
        .fetch_one(self.pool().await?)
        .await?;

        debug!(room = %row.room, elapsed = ?start.elapsed(), "inserted message");
        row.try_into()
    }

    async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>> {
        let start = Instant::now();
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, room, username, user_color, message, created_at FROM (
                SELECT rowid AS seq, id, room, username, user_color, message, created_at
                FROM messages
                WHERE room = ?
                ORDER BY created_at DESC, seq DESC
                LIMIT ?
             ) ORDER BY created_at ASC, seq ASC",
        )
        .bind(room)
        .bind(i64::from(limit))
        .fetch_all(self.pool().await?)
        .await?;

        debug!(room, rows = rows.len(), elapsed = ?start.elapsed(), "listed messages");
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn touch(&self, typing: NewTyping) -> ChatResult<()> {
        sqlx::query(
            "INSERT INTO typing_indicators (room, username, user_color, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (room, username)
             DO UPDATE SET updated_at = excluded.updated_at, user_color = excluded.user_color",
        )
        .bind(typing.room())
        .bind(typing.username())
        .bind(typing.user_color())
        .bind(to_millis(OffsetDateTime::now_utc()))
        .execute(self.pool().await?)
        .await?;

        Ok(())
    }

    async fn clear(&self, room: &str, username: &str) -> ChatResult<()> {
        sqlx::query("DELETE FROM typing_indicators WHERE room = ? AND username = ?")
            .bind(room)
            .bind(username)
            .execute(self.pool().await?)
            .await?;

        Ok(())
    }

    async fn list_active(&self, room: &str, now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT room, username, user_color, updated_at
             FROM typing_indicators
             WHERE room = ? AND updated_at > ?
             ORDER BY username",
        )
        .bind(room)
        .bind(to_millis(now - TYPING_WINDOW))
        .fetch_all(self.pool().await?)
        .await?;

        rows.into_iter()
            .map(|(room, username, user_color, updated_at)| {
                Ok(TypingIndicator {
                    room,
                    username,
                    user_color,
                    updated_at: from_millis(updated_at)?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("Closed {}", self.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:", 16)
    }

    fn draft(room: &str, text: &str) -> NewMessage {
        NewMessage::new(room, "Ape42", "#836ef9", text).unwrap()
    }

    #[tokio::test]
    async fn append_returns_stored_record() {
        let store = store();
        let sent = store.append(draft("lobby", "gm 🚀")).await.unwrap();

        assert!(Uuid::parse_str(&sent.id).is_ok());
        assert_eq!(sent.room, "lobby");
        assert_eq!(sent.text, "gm 🚀");

        let listed = store.list("lobby", 50).await.unwrap();
        assert_eq!(listed, vec![sent]);
    }

    #[tokio::test]
    async fn created_at_never_goes_backwards() {
        let store = store();
        let mut previous = None;
        for i in 0..20 {
            let sent = store.append(draft("lobby", &i.to_string())).await.unwrap();
            if let Some(previous) = previous {
                assert!(sent.created_at >= previous);
            }
            previous = Some(sent.created_at);
        }

        let listed = store.list("lobby", 1000).await.unwrap();
        assert_eq!(listed.len(), 20);
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn list_returns_newest_in_ascending_order() {
        let store = store();
        for i in 0..10 {
            store.append(draft("dev", &i.to_string())).await.unwrap();
        }
        store.append(draft("usa", "other room")).await.unwrap();

        let texts: Vec<_> = store
            .list("dev", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|message| message.text)
            .collect();
        assert_eq!(texts, ["7", "8", "9"]);
    }

    #[tokio::test]
    async fn concurrent_first_use_initialises_once() {
        let store = std::sync::Arc::new(store());
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.append(draft("lobby", &i.to_string())).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.list("lobby", 50).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn typing_upsert_and_expiry() {
        let store = store();
        store.clear("lobby", "Ape42").await.unwrap();

        store.touch(NewTyping::new("lobby", "Ape42", "#000000").unwrap()).await.unwrap();
        store.touch(NewTyping::new("lobby", "Ape42", "#ffffff").unwrap()).await.unwrap();

        let now = OffsetDateTime::now_utc();
        let active = store.list_active("lobby", now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_color, "#ffffff");

        assert!(store.list_active("lobby", now + Duration::seconds(11)).await.unwrap().is_empty());
        assert!(store.list_active("dev", now).await.unwrap().is_empty());

        store.clear("lobby", "Ape42").await.unwrap();
        assert!(store.list_active("lobby", now).await.unwrap().is_empty());
    }
}
