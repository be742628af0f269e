use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("sending too fast, wait a moment")]
    RateLimited,
}

impl ChatError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self::BackendUnavailable(reason.into())
    }
}

macro_rules! backend_err_impl {
    ($E:ty) => {
        impl From<$E> for ChatError {
            fn from(err: $E) -> Self {
                Self::BackendUnavailable(Box::new(err))
            }
        }
    };
}

backend_err_impl!(sqlx::Error);
backend_err_impl!(reqwest::Error);
backend_err_impl!(serde_json::Error);
backend_err_impl!(time::error::ComponentRange);
backend_err_impl!(time::error::Parse);
backend_err_impl!(time::error::Format);
