use axum::{Json, debug_handler, extract::State};
use time::OffsetDateTime;

use super::{Params, Payload};
use crate::{
    AppResult,
    db::{NewTyping, room_or_default},
    error::ChatError,
    store::SharedStore,
    wire::{SuccessResponse, TypingBody, TypingQuery, TypingResponse},
};

#[debug_handler]
pub(crate) async fn touch_typing(
    State(store): State<SharedStore>,
    Payload(TypingBody { room, username, user_color }): Payload<TypingBody>,
) -> AppResult<Json<SuccessResponse>> {
    let typing = NewTyping::new(
        room.unwrap_or_default(),
        username.unwrap_or_default(),
        user_color.unwrap_or_default(),
    )?;

    store.touch(typing).await?;
    Ok(Json(SuccessResponse::OK))
}

#[debug_handler]
pub(crate) async fn clear_typing(
    State(store): State<SharedStore>,
    Params(TypingQuery { room, username }): Params<TypingQuery>,
) -> AppResult<Json<SuccessResponse>> {
    let (Some(room), Some(username)) = (
        room.filter(|room| !room.is_empty()),
        username.filter(|username| !username.is_empty()),
    ) else {
        return Err(ChatError::validation("Missing room or username").into());
    };

    store.clear(&room, &username).await?;
    Ok(Json(SuccessResponse::OK))
}

#[debug_handler]
pub(crate) async fn list_typing(
    State(store): State<SharedStore>,
    Params(TypingQuery { room, .. }): Params<TypingQuery>,
) -> AppResult<Json<TypingResponse>> {
    let room = room_or_default(room.unwrap_or_default());

    let typing = store.list_active(&room, OffsetDateTime::now_utc()).await?;
    Ok(Json(TypingResponse { typing }))
}
