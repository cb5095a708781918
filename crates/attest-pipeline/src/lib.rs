//! # Attest Pipeline
//!
//! Commits a document and its ledger record as one logical unit.
//!
//! A submission moves `Received → HashComputed → Stored → LedgerPending →
//! Committed`, or ends in `StoreFailed`, `LedgerFailed` or `Rejected`. The
//! token id doubles as idempotency key: runs sharing one are serialized, and a
//! retried append that hits its own earlier write converges to `Committed`.
//! Documents stored without a committed record land in the
//! [`OrphanBacklog`] and are settled later by the [`Reconciler`].
//!
//! ## What's NOT in this crate
//!
//! - Ledger validation rules (`attest-ledger`)
//! - Store addressing (`attest-store`)

#![forbid(unsafe_code)]

pub mod error;
pub mod locks;
pub mod orphan;
pub mod pipeline;
pub mod reconcile;
pub mod state;
pub mod submission;
pub mod tracker;

pub use error::PipelineError;
pub use locks::{KeyGuard, KeyLocks};
pub use orphan::{
    OrphanBacklog, OrphanEntry, OrphanGuard, OrphanKey, OrphanReason, OrphanStatus,
};
pub use pipeline::CommitPipeline;
pub use reconcile::{ReconcileReport, Reconciler};
pub use state::SubmissionState;
pub use submission::{CommitReceipt, Submission, SubmissionMetadata, SUPPORTED_CURRENCIES};
pub use tracker::SubmissionTracker;
