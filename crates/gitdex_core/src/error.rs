//! Error types for workspace operations.

use gitdex_model::ModelError;
use gitdex_search::SearchError;
use gitdex_storage::StorageError;
use thiserror::Error;

/// Result type for workspace operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in workspace operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Versioned storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Search index error.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Record validation error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The configuration cannot be used.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if the error means a record or path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_not_found())
    }
}
