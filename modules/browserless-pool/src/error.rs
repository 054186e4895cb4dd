use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no worker available within {0:?}")]
    ResourceExhausted(Duration),

    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("pool is closed")]
    Closed,
}

impl From<reqwest::Error> for PoolError {
    fn from(err: reqwest::Error) -> Self {
        PoolError::Network(err.to_string())
    }
}
