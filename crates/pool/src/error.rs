//! Pool service error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The addressed job, task or pool does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("pool service returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    /// The service URL cannot address the service's resources.
    #[error("invalid pool service configuration: {0}")]
    Config(String),
}

impl PoolError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PoolError::NotFound(_))
    }
}
