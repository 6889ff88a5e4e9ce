//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while building, validating or decoding records.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A type identifier is malformed.
    #[error("invalid type id: {message}")]
    InvalidTypeId {
        /// Description of the problem.
        message: String,
    },

    /// A record identifier is malformed.
    #[error("invalid record id {id:?}: {reason}")]
    InvalidRecordId {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A value was supplied for a field the schema does not declare.
    #[error("unknown field {field:?} for type {type_name}")]
    UnknownField {
        /// Qualified type name.
        type_name: String,
        /// The unknown field name.
        field: String,
    },

    /// A reserved name was used as a field.
    #[error("field name {field:?} is reserved")]
    ReservedField {
        /// The reserved name.
        field: String,
    },

    /// The same field was supplied twice (directly and through an alias).
    #[error("field {field:?} supplied more than once")]
    DuplicateField {
        /// Canonical field name.
        field: String,
    },

    /// A required field has no value and no default.
    #[error("missing required field {field:?}")]
    MissingField {
        /// Canonical field name.
        field: String,
    },

    /// A value does not match the declared field kind.
    #[error("invalid value for field {field:?}: expected {expected}")]
    InvalidValue {
        /// Canonical field name.
        field: String,
        /// Name of the expected kind.
        expected: &'static str,
    },

    /// The serialized form could not be decoded into a record.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Creates an invalid type id error.
    pub fn invalid_type_id(message: impl Into<String>) -> Self {
        Self::InvalidTypeId {
            message: message.into(),
        }
    }

    /// Creates an invalid record id error.
    pub fn invalid_record_id(id: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidRecordId {
            id: id.into(),
            reason,
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
