//! Error types for the protocol layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding, or validating
/// values at the sync boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value failed boundary validation.
    #[error("validation failed for `{field}`: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the violation.
        message: String,
    },

    /// A response envelope was missing a field required on the
    /// success path.
    #[error("response envelope missing `{field}`")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
}

impl ProtocolError {
    /// Creates a validation error.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Creates a missing-field error.
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}
