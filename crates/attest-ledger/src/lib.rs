//! # Attest Ledger
//!
//! The system of record: an append-only, authorization-gated store of
//! transaction records with globally unique token ids.
//!
//! ## Architecture
//!
//! - [`Ledger`]: synchronous state machine. Validates, journals, applies and
//!   emits one mutation at a time.
//! - [`LedgerService`]: single-writer sequencer giving all mutations one total
//!   order. Its [`LedgerHandle`] serves reads from a shared snapshot.
//! - [`LedgerClient`]: async boundary used by the commit pipeline.
//! - [`LedgerJournal`]: durable mutation log replayed on start.
//! - [`EventLog`]: outbound events for downstream indexers.
//!
//! ## What's NOT in this crate
//!
//! - Retries. A rejected or failed call is reported once; retrying is the
//!   pipeline's decision.
//! - Document storage (`attest-store`)

#![forbid(unsafe_code)]

pub mod client;
pub mod event;
pub mod journal;
pub mod record;
pub mod service;
pub mod state;

pub use client::LedgerClient;
pub use event::{EventEnvelope, EventLog, LedgerEvent};
pub use journal::{FileJournal, JournalEntry, JournalError, LedgerJournal, MemoryJournal};
pub use record::{AppendRequest, PrincipalStats, Receipt, TransactionRecord};
pub use service::{LedgerHandle, LedgerService};
pub use state::{Ledger, LedgerBuilder};
