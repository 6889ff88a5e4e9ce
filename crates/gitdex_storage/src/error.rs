//! Error types for storage operations.

use gitdex_http::HttpError;
use gitdex_model::{ModelError, RecordId, TypeId};
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The record has no id and cannot be persisted.
    #[error("cannot store a {type_id} record without an id")]
    MissingId {
        /// Type of the offending record.
        type_id: TypeId,
    },

    /// A read-only record was passed to a mutating call.
    #[error("cannot store or delete a read-only {type_id} record")]
    ReadOnlyRecord {
        /// Type of the offending record.
        type_id: TypeId,
    },

    /// The stored record carries a different id than the one requested.
    #[error("stored id {found} does not match requested id {requested}")]
    IdMismatch {
        /// The id that was asked for.
        requested: RecordId,
        /// The id found in the stored data.
        found: String,
    },

    /// The record or path does not exist.
    #[error("{path} does not exist")]
    NotFound {
        /// Repository path that was looked up.
        path: String,
    },

    /// The operation could not be routed to exactly one working tree.
    #[error("cannot route to a working tree: {reason}")]
    AmbiguousRouting {
        /// Why routing failed.
        reason: String,
    },

    /// A commit message cannot be represented as plain bytes.
    #[error("commit message cannot be encoded: {message}")]
    Encoding {
        /// Description of the problem.
        message: String,
    },

    /// A mutating call was made against read-only storage.
    #[error("remote storage is read only")]
    ReadOnlyBackend,

    /// The operation is not available on this storage.
    #[error("{operation} is not supported by this storage")]
    Unsupported {
        /// Operation name.
        operation: &'static str,
    },

    /// The path does not name a record of a registered type.
    #[error("{path} does not look like a record file")]
    NotARecordPath {
        /// The offending path.
        path: String,
    },

    /// A data path escapes the working tree or is empty.
    #[error("invalid repository path: {path:?}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// The record type has not been registered.
    #[error("record type {type_id} is not registered")]
    UnregisteredType {
        /// The unknown type.
        type_id: TypeId,
    },

    /// No remote with this name is configured.
    #[error("remote {name} is not configured")]
    UnknownRemote {
        /// Remote name.
        name: String,
    },

    /// Merging fetched commits produced conflicts.
    #[error("merging {remote}/{branch} produced conflicts")]
    MergeConflict {
        /// Remote name.
        remote: String,
        /// Branch name.
        branch: String,
    },

    /// HEAD does not point at a branch.
    #[error("HEAD is detached in {tree}")]
    DetachedHead {
        /// Working tree name.
        tree: String,
    },

    /// The mirror URL could not be parsed.
    #[error("invalid storage URL: {url}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },

    /// Record (de)serialization or validation failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A git operation failed.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An HTTP exchange with a mirror failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A mirror response was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates an ambiguous routing error.
    pub fn ambiguous(reason: impl Into<String>) -> Self {
        Self::AmbiguousRouting {
            reason: reason.into(),
        }
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns true if the error means "the thing is not there", as opposed
    /// to a failure while looking.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Http(HttpError::Status { status, .. }) => *status == 404,
            _ => false,
        }
    }
}
