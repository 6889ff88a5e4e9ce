//! Error types for index operations.

use gitdex_http::HttpError;
use gitdex_model::{ModelError, TypeId};
use thiserror::Error;

/// Result type for index operations.
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur while talking to the search backend.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The index does not exist.
    #[error("index {index} does not exist")]
    IndexNotFound {
        /// Index name.
        index: String,
    },

    /// The index already exists.
    #[error("index {index} already exists")]
    IndexExists {
        /// Index name.
        index: String,
    },

    /// A record without an id cannot be indexed.
    #[error("cannot index a {type_id} record without an id")]
    MissingId {
        /// Record type.
        type_id: TypeId,
    },

    /// A scroll cursor is unknown or has expired.
    #[error("scroll {scroll_id} is gone")]
    ScrollExpired {
        /// Cursor returned by the backend.
        scroll_id: String,
    },

    /// The backend answered with something unexpected.
    #[error("unexpected backend response: {0}")]
    Protocol(String),

    /// The index did not become ready in time.
    #[error("index {index} not ready after {attempts} attempts")]
    Timeout {
        /// Index name.
        index: String,
        /// Polls made.
        attempts: u32,
    },

    /// Waiting was cancelled.
    #[error("wait cancelled")]
    Cancelled,

    /// A document could not be turned back into a record.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// HTTP transport or status error.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Invalid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Http(e) => e.is_retryable(),
            SearchError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SearchError::Http(HttpError::Transport("refused".into())).is_retryable());
        assert!(SearchError::Timeout {
            index: "i".into(),
            attempts: 3
        }
        .is_retryable());
        assert!(!SearchError::Cancelled.is_retryable());
        assert!(!SearchError::IndexNotFound { index: "i".into() }.is_retryable());
    }
}
