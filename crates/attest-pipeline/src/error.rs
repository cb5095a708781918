//! Pipeline-level failures
//!
//! Each variant corresponds to one terminal failure state, so a caller can
//! tell from the error alone whether an orphaned document exists.

use crate::state::SubmissionState;
use attest_core::{AttestError, ContentPointer, ReasonCode, TokenId};

/// Terminal failure of a submission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Deterministic rejection; resubmitting unchanged is useless
    #[error("submission {token_id} rejected: {source}")]
    Rejected {
        /// Idempotency key
        token_id: TokenId,
        /// Rejection from validation or the ledger
        source: AttestError,
        /// Document left behind, when the rejection came after upload
        orphaned: Option<ContentPointer>,
    },

    /// Upload never succeeded; no ledger write was attempted
    #[error("submission {token_id} failed to store after {attempts} attempt(s): {source}")]
    StoreFailed {
        /// Idempotency key
        token_id: TokenId,
        /// Last store error
        source: AttestError,
        /// Uploads attempted
        attempts: u32,
    },

    /// Document stored but the ledger append could not be confirmed
    #[error("submission {token_id} stored at {content_pointer} but ledger failed after {attempts} attempt(s): {source}")]
    LedgerFailed {
        /// Idempotency key
        token_id: TokenId,
        /// Last ledger error
        source: AttestError,
        /// Orphaned document, now in the reconciliation backlog
        content_pointer: ContentPointer,
        /// Appends attempted
        attempts: u32,
    },
}

impl PipelineError {
    /// Idempotency key of the failed submission
    pub fn token_id(&self) -> &TokenId {
        match self {
            Self::Rejected { token_id, .. }
            | Self::StoreFailed { token_id, .. }
            | Self::LedgerFailed { token_id, .. } => token_id,
        }
    }

    /// The underlying error
    pub fn cause(&self) -> &AttestError {
        match self {
            Self::Rejected { source, .. }
            | Self::StoreFailed { source, .. }
            | Self::LedgerFailed { source, .. } => source,
        }
    }

    /// Stable reason code of the underlying error
    pub fn reason(&self) -> ReasonCode {
        self.cause().reason()
    }

    /// Offending field, if any
    pub fn field(&self) -> Option<&str> {
        self.cause().field()
    }

    /// Whether resubmitting the same submission may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Pointer of a stored document with no committed record
    pub fn orphan(&self) -> Option<&ContentPointer> {
        match self {
            Self::Rejected { orphaned, .. } => orphaned.as_ref(),
            Self::LedgerFailed {
                content_pointer, ..
            } => Some(content_pointer),
            Self::StoreFailed { .. } => None,
        }
    }

    /// Terminal state this failure represents
    pub fn state(&self) -> SubmissionState {
        match self {
            Self::Rejected { .. } => SubmissionState::Rejected,
            Self::StoreFailed { .. } => SubmissionState::StoreFailed,
            Self::LedgerFailed { .. } => SubmissionState::LedgerFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::Service;

    #[test]
    fn test_retryability_and_orphans() {
        let rejected = PipelineError::Rejected {
            token_id: TokenId::new("T1"),
            source: AttestError::conflict("T1"),
            orphaned: None,
        };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.reason(), ReasonCode::DuplicateTokenId);
        assert!(rejected.orphan().is_none());

        let failed = PipelineError::LedgerFailed {
            token_id: TokenId::new("T1"),
            source: AttestError::transient(Service::Ledger, "down"),
            content_pointer: ContentPointer::new("bafk1"),
            attempts: 4,
        };
        assert!(failed.is_retryable());
        assert_eq!(failed.reason(), ReasonCode::LedgerUnavailable);
        assert_eq!(failed.orphan(), Some(&ContentPointer::new("bafk1")));
        assert_eq!(failed.state(), SubmissionState::LedgerFailed);
    }
}
