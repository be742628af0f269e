use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use time::OffsetDateTime;

use crate::{
    db::{Message, NewMessage, NewTyping, TypingIndicator},
    error::{ChatError, ChatResult},
    wire::{
        ErrorResponse, ListMessagesQuery, MessageResponse, MessagesResponse, SendMessageBody,
        TypingBody, TypingQuery, TypingResponse,
    },
};

use super::ChatStore;

/// Talks to a Monadssenger server's `/api` resources.
pub struct HttpStore {
    client: Client,
    base: Url,
}

impl HttpStore {
    /// `base` is the API root, e.g. `http://127.0.0.1:8080/api/`.
    pub fn new(base: &str, timeout: Duration) -> ChatResult<Self> {
        let mut base = Url::parse(base)
            .map_err(|e| ChatError::unavailable(format!("bad server url {base}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base,
        })
    }

    fn url(&self, resource: &str) -> ChatResult<Url> {
        self.base
            .join(resource)
            .map_err(|e| ChatError::unavailable(format!("bad resource {resource}: {e}")))
    }

    async fn check(response: Response) -> ChatResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reason = response
            .json::<ErrorResponse>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());

        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ChatError::Validation(reason),
            StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimited,
            _ => ChatError::unavailable(format!("{status}: {reason}")),
        })
    }
}

#[async_trait]
impl ChatStore for HttpStore {
    async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        let body = SendMessageBody {
            room: Some(message.room().to_owned()),
            username: Some(message.username().to_owned()),
            user_color: Some(message.user_color().to_owned()),
            message: Some(message.text().to_owned()),
        };

        let response = self.client.post(self.url("messages")?).json(&body).send().await?;
        let MessageResponse { message } = Self::check(response).await?.json().await?;
        Ok(message)
    }

    async fn list(&self, room: &str, limit: u32) -> ChatResult<Vec<Message>> {
        let query = ListMessagesQuery {
            room: Some(room.to_owned()),
            limit: Some(limit),
        };

        let response = self.client.get(self.url("messages")?).query(&query).send().await?;
        let MessagesResponse { messages } = Self::check(response).await?.json().await?;
        Ok(messages)
    }

    async fn touch(&self, typing: NewTyping) -> ChatResult<()> {
        let body = TypingBody {
            room: Some(typing.room().to_owned()),
            username: Some(typing.username().to_owned()),
            user_color: Some(typing.user_color().to_owned()),
        };

        let response = self.client.post(self.url("typing")?).json(&body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn clear(&self, room: &str, username: &str) -> ChatResult<()> {
        let query = TypingQuery {
            room: Some(room.to_owned()),
            username: Some(username.to_owned()),
        };

        let response = self.client.delete(self.url("typing")?).query(&query).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// The server's window is authoritative, so `now` is not used.
    async fn list_active(&self, room: &str, _now: OffsetDateTime) -> ChatResult<Vec<TypingIndicator>> {
        let query = TypingQuery {
            room: Some(room.to_owned()),
            username: None,
        };

        let response = self.client.get(self.url("typing")?).query(&query).send().await?;
        let TypingResponse { typing } = Self::check(response).await?.json().await?;
        Ok(typing)
    }
}
