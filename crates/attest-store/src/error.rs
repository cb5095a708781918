//! Content store errors

use attest_core::{AttestError, ReasonCode, Service};

/// Failure reported by a content store or its client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable or timed out; retryable
    #[error("content store unavailable: {0}")]
    Unavailable(String),

    /// No document under the pointer; terminal
    #[error("content not found: {0}")]
    NotFound(String),

    /// Request rejected before reaching the store
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Stable reason code
        code: ReasonCode,
        /// Offending field
        field: String,
        /// Human readable detail
        message: String,
    },
}

impl StoreError {
    /// Whether repeating the call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for AttestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => AttestError::transient(Service::Store, message),
            StoreError::NotFound(message) => AttestError::not_found(message),
            StoreError::Invalid {
                code,
                field,
                message,
            } => AttestError::validation(code, field, message),
        }
    }
}
