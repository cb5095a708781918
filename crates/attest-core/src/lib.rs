//! # Attest Core
//!
//! Foundation types shared by every attest crate: identifiers, the unified
//! error taxonomy, canonical content hashing, retry policy, the ledger clock
//! and configuration.
//!
//! ## What's NOT in this crate
//!
//! - Ledger state and sequencing (`attest-ledger`)
//! - Authorization registry (`attest-authorization`)
//! - Content store adapters (`attest-store`)
//! - Commit orchestration (`attest-pipeline`)

#![forbid(unsafe_code)]

/// Configuration loading, overrides and validation
pub mod config;

/// Unified error handling
pub mod errors;

/// Canonical content and metadata hashing
pub mod hash;

/// Principal, token, content and classification identifiers
pub mod identifiers;

/// Bounded retry with backoff
pub mod retry;

/// Ledger time source
pub mod time;

/// Token id generation and parsing
pub mod token;

pub use config::AttestConfig;
pub use errors::{AttestError, ReasonCode, Result as AttestResult, Service};
pub use hash::{content_hash, metadata_digest};
pub use identifiers::{
    ContentHash, ContentPointer, Principal, TokenId, TransactionType, MAX_TOKEN_ID_BYTES,
};
pub use retry::{RetryOutcome, RetryPolicy};
pub use time::{HighWaterMark, LedgerClock, SystemClock};
pub use token::{TokenFormat, TokenIdGenerator, TokenMetadata};
