use axum::{Json, debug_handler, extract::State};
use tokio::time::Instant;
use tracing::info;

use super::{Params, Payload};
use crate::{
    AppResult, AppState,
    db::{NewMessage, room_or_default},
    error::ChatError,
    limiter::KeyedRateLimiter,
    store::SharedStore,
    wire::{ListMessagesQuery, MessageResponse, MessagesResponse, SendMessageBody},
};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

#[debug_handler(state = AppState)]
pub(crate) async fn list_messages(
    State(store): State<SharedStore>,
    Params(ListMessagesQuery { room, limit }): Params<ListMessagesQuery>,
) -> AppResult<Json<MessagesResponse>> {
    let room = room_or_default(room.unwrap_or_default());
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let messages = store.list(&room, limit).await?;
    Ok(Json(MessagesResponse { messages }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    State(store): State<SharedStore>,
    State(limiter): State<Option<KeyedRateLimiter>>,
    Payload(SendMessageBody { room, username, user_color, message }): Payload<SendMessageBody>,
) -> AppResult<Json<MessageResponse>> {
    let message = NewMessage::new(
        room.unwrap_or_default(),
        username.unwrap_or_default(),
        user_color.unwrap_or_default(),
        message.unwrap_or_default(),
    )?;

    if let Some(limiter) = limiter {
        if !limiter.try_acquire(message.username(), Instant::now()) {
            return Err(ChatError::RateLimited.into());
        }
    }

    let message = store.append(message).await?;
    info!("{}@{} sent {}", message.username, message.room, message.id);

    Ok(Json(MessageResponse { message }))
}
