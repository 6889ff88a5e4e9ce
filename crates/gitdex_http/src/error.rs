//! Error types for HTTP helpers.

use thiserror::Error;

/// Result type for HTTP helpers.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors produced while interpreting HTTP responses.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The body was not the expected JSON.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    /// Returns true if retrying the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Transport(_) => true,
            HttpError::Status { status, .. } => *status >= 500 || *status == 429,
            HttpError::Json(_) => false,
        }
    }
}
