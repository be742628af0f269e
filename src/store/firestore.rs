use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::{
    config::FirebaseConfig,
    db::{Message, NewMessage, NewTyping, TypingIndicator},
    error::{ChatError, ChatResult},
};

use super::ChatStore;

const MESSAGES: &str = "messages";
const TYPING: &str = "typing_indicators";

/// Firestore values as they appear in the REST API, only the kinds this
/// store writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Value {
    StringValue(String),
    TimestampValue(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct QueryItem {
    document: Option<Document>,
}

impl Document {
    fn with_string(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_owned(), Value::StringValue(value.to_owned()));
        self
    }

    fn with_timestamp(mut self, key: &str, value: OffsetDateTime) -> ChatResult<Self> {
        self.fields
            .insert(key.to_owned(), Value::TimestampValue(value.format(&Rfc3339)?));
        Ok(self)
    }

    fn string(&self, key: &str) -> ChatResult<String> {
        match self.fields.get(key) {
            Some(Value::StringValue(value)) => Ok(value.clone()),
            _ => Err(ChatError::unavailable(format!("document field {key} is not a string"))),
        }
    }

    fn timestamp(&self, key: &str) -> ChatResult<OffsetDateTime> {
        match self.fields.get(key) {
            Some(Value::TimestampValue(value)) => Ok(OffsetDateTime::parse(value, &Rfc3339)?),
            _ => Err(ChatError::unavailable(format!("document field {key} is not a timestamp"))),
        }
    }

    fn id(&self) -> ChatResult<String> {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .map(str::to_owned)
            .ok_or_else(|| ChatError::unavailable("document without a name"))
    }

    fn into_message(self) -> ChatResult<Message> {
        Ok(Message {
            id: self.id()?,
            room: self.string("room")?,
            username: self.string("username")?,
            user_color: self.string("user_color")?,
            text: self.string("message")?,
            created_at: self.timestamp("created_at")?,
        })
    }

    fn into_typing(self) -> ChatResult<TypingIndicator> {
        Ok(TypingIndicator {
            room: self.string("room")?,
            username: self.string("username")?,
            user_color: self.string("user_color")?,
            updated_at: self.timestamp("updated_at")?,
        })
    }
}

fn room_query(collection: &str, room: &str) -> serde_json::Value {
    json!({
        "from": [{ "collectionId": collection }],
        "where": {
            "fieldFilter": {
                "field": { "fieldPath": "room" },
                "op": "EQUAL",
                "value": { "stringValue": room },
            }
        },
    })
}

/// Typing documents are keyed by room and user so writes upsert. Each part is
/// escaped so distinct pairs never share an id and ids hold no `/`.
fn typing_id(room: &str, username: &str) -> String {
    format!("{}:{}", escape_id_part(room), escape_id_part(username))
}

fn escape_id_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '/' => escaped.push_str("%2F"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Document store over the Firestore REST API.
pub struct FirestoreStore {
    client: Client,
    documents: Url,
    api_key: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: FirebaseConfig) -> ChatResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ChatError::unavailable(format!("bad firestore url {}: {e}", config.base_url)))?;
        let documents = base
            .join(&format!("projects/{}/databases/(default)/documents/", config.project_id))
            .map_err(|e| ChatError::unavailable(format!("bad firebase project id: {e}")))?;

        Ok(Self {
            client: Client::new(),
            documents,
            api_key: config.api_key,
        })
    }

    fn url(&self, segments: &[&str]) -> ChatResult<Url> {
        let mut url = self.documents.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::unavailable("firestore url cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn run_query_url(&self) -> Url {
        let mut url = self.documents.clone();
        let path = format!("{}:runQuery", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key)]),
            None => request,
        }
    }

    async fn run_query(&self, query: serde_json::Value) -> ChatResult<Vec<Document>> {
        let items: Vec<QueryItem> = self
            .authorized(self.client.post(self.run_query_url()))
            .json(&json!({ "structuredQuery": query }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }
}

#[async_trait]
impl ChatStore for FirestoreStore {
    async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        let document = Document::default()
            .with_string("room", message.room())
            .with_string("username", message.username())
            .with_string("user_color", message.user_color())
            .with_string("message", message.text())
            .with_timestamp("created_at", OffsetDateTime::now_utc())?;

        let created: Document = self
            .authorized(self.client.post(self.url(&[MESSAGES])?))
            .json(&document)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        created.into_message()
    }

    async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>> {
        let mut query = room_query(MESSAGES, room);
        query["orderBy"] = json!([{ "field": { "fieldPath": "created_at" }, "direction": "DESCENDING" }]);
        query["limit"] = json!(limit);

        let mut messages = self
            .run_query(query)
            .await?
            .into_iter()
            .map(Document::into_message)
            .collect::<ChatResult<Vec<_>>>()?;
        messages.reverse();

        debug!(room, rows = messages.len(), "listed messages");
        Ok(messages)
    }

    async fn touch(&self, typing: NewTyping) -> ChatResult<()> {
        let document = Document::default()
            .with_string("room", typing.room())
            .with_string("username", typing.username())
            .with_string("user_color", typing.user_color())
            .with_timestamp("updated_at", OffsetDateTime::now_utc())?;

        self.authorized(
            self.client
                .patch(self.url(&[TYPING, &typing_id(typing.room(), typing.username())])?),
        )
        .json(&document)
        .send()
        .await?
        .error_for_status()?;

        Ok(())
    }

    async fn clear(&self, room: &str, username: &str) -> ChatResult<()> {
        let response = self
            .authorized(self.client.delete(self.url(&[TYPING, &typing_id(room, username)])?))
            .send()
            .await?;

        if response.status() != StatusCode::NOT_FOUND {
            response.error_for_status()?;
        }
        Ok(())
    }

    async fn list_active(&self, room: &str, now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>> {
        let mut active = Vec::new();
        for document in self.run_query(room_query(TYPING, room)).await? {
            let indicator = document.into_typing()?;
            if indicator.is_active(now) {
                active.push(indicator);
            }
        }
        active.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(active)
    }
}
