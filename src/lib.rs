pub mod appresult;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod rooms;
pub mod store;
pub mod sync;
pub mod text;
pub mod wire;

use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    http::{Method, header::CONTENT_TYPE},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use appresult::{AppError, AppResult};

use config::Config;
use limiter::KeyedRateLimiter;
use store::SharedStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: SharedStore,
    pub limiter: Option<KeyedRateLimiter>,
}

impl AppState {
    pub fn new(store: SharedStore, config: &Config) -> Self {
        Self {
            store,
            limiter: config.server_rate_limit.then(KeyedRateLimiter::default),
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/api", rooms::router())
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
