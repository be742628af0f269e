mod msg;
mod typing;

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts, Query},
    routing::get,
};

use crate::{AppError, AppState};

pub use msg::{DEFAULT_LIMIT, MAX_LIMIT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(msg::list_messages).post(msg::send_message))
        .route(
            "/typing",
            get(typing::list_typing)
                .post(typing::touch_typing)
                .delete(typing::clear_typing),
        )
}

/// JSON body whose rejection is a `{ "error": ... }` 400 like every other.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub(crate) struct Payload<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub(crate) struct Params<T>(pub T);
