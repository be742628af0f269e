//! JSON bodies of the `/api` resources, shared by the handlers and
//! [`HttpStore`](crate::store::HttpStore).

use serde::{Deserialize, Serialize};

use crate::db::{Message, TypingIndicator};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListMessagesQuery {
    pub room: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_color: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TypingBody {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_color: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TypingQuery {
    pub room: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TypingResponse {
    pub typing: Vec<TypingIndicator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub const OK: Self = Self { success: true };
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
