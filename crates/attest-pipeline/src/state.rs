//! Per-submission state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a submission currently is
///
/// ```text
/// Received -> HashComputed -> Stored -> LedgerPending -> Committed
///     |             |            |             |
///     v             v            v             v
///  Rejected     StoreFailed   Rejected   LedgerFailed | Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    /// Accepted for processing
    Received,
    /// Canonical hash computed
    HashComputed,
    /// Document uploaded
    Stored,
    /// Ledger append in flight
    LedgerPending,
    /// Document and record both exist and are bound
    Committed,
    /// Upload retries exhausted; nothing was written to the ledger
    StoreFailed,
    /// Ledger retries exhausted after upload; the document is an orphan
    LedgerFailed,
    /// Deterministic rejection; never retried
    Rejected,
}

impl SubmissionState {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::StoreFailed | Self::LedgerFailed | Self::Rejected
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: SubmissionState) -> bool {
        use SubmissionState::*;
        matches!(
            (self, next),
            (Received, HashComputed)
                | (Received, Rejected)
                | (HashComputed, Stored)
                | (HashComputed, StoreFailed)
                | (HashComputed, Rejected)
                | (HashComputed, Committed)
                | (Stored, LedgerPending)
                | (LedgerPending, Committed)
                | (LedgerPending, LedgerFailed)
                | (LedgerPending, Rejected)
        )
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::HashComputed => "hash_computed",
            Self::Stored => "stored",
            Self::LedgerPending => "ledger_pending",
            Self::Committed => "committed",
            Self::StoreFailed => "store_failed",
            Self::LedgerFailed => "ledger_failed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}
