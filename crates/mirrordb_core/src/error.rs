//! Error types for MirrorDB core.

use mirrordb_protocol::PostId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the local engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A mutation targeted a key that already has a pending overlay.
    ///
    /// The whole transaction is rejected before anything is applied;
    /// the existing overlay is untouched. Recoverable: wait for the
    /// in-flight transaction to resolve, then retry.
    #[error("pending overlay already exists for {id}")]
    Conflict {
        /// The contended key.
        id: PostId,
    },

    /// A transaction was begun with no mutations.
    #[error("transaction must contain at least one mutation")]
    EmptyTransaction,

    /// An update or delete targeted a post that is not in the local
    /// store, so there is no pre-mutation snapshot to roll back to.
    #[error("{id} is not present in the local store")]
    NotLoaded {
        /// The missing key.
        id: PostId,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The remote store rejected a transaction.
    #[error("sync failed: {0}")]
    Sync(#[from] SyncFailure),
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

/// A failure reported by the sync adapter.
///
/// Every variant triggers the same recovery: the whole transaction's
/// overlays are discarded and the store reverts to its pre-mutation
/// state. The variants exist so callers can present a meaningful
/// reason and decide whether a retry is worthwhile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFailure {
    /// The target post does not exist on the server (HTTP 404).
    #[error("{id} was not found on the server")]
    NotFound {
        /// The missing key.
        id: PostId,
    },

    /// The server answered with a non-2xx status.
    #[error("server returned status {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, if any.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the transport problem.
        message: String,
    },

    /// The server answered but the body could not be understood.
    #[error("malformed server response: {message}")]
    MalformedResponse {
        /// Description of the decoding problem.
        message: String,
    },

    /// The mutation failed boundary validation before it was sent.
    #[error("rejected before send: {message}")]
    Rejected {
        /// Description of the validation failure.
        message: String,
    },
}

impl SyncFailure {
    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a malformed-response failure.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Creates a rejected-before-send failure.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a server failure from a status code and message.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the target was absent on the server.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if retrying the same mutation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::MalformedResponse { .. } | Self::Rejected { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_failures() {
        assert!(SyncFailure::transport("connection refused").is_retryable());
        assert!(SyncFailure::server(500, "boom").is_retryable());
        assert!(!SyncFailure::server(400, "bad request").is_retryable());
        assert!(!SyncFailure::NotFound { id: PostId::new(7) }.is_retryable());
        assert!(!SyncFailure::rejected("empty title").is_retryable());
    }

    #[test]
    fn not_found_is_distinguishable() {
        let failure = SyncFailure::NotFound { id: PostId::new(3) };
        assert!(failure.is_not_found());
        assert!(failure.to_string().contains("post:3"));

        let failure = SyncFailure::server(500, "boom");
        assert!(!failure.is_not_found());
    }

    #[test]
    fn conflict_display_names_the_key() {
        let err = CoreError::Conflict { id: PostId::new(3) };
        assert_eq!(err.to_string(), "pending overlay already exists for post:3");
    }

    #[test]
    fn sync_failure_converts_to_core_error() {
        let err: CoreError = SyncFailure::transport("timeout").into();
        assert!(matches!(err, CoreError::Sync(_)));
    }
}
