//! Ledger record types

use attest_core::{ContentHash, ContentPointer, Principal, TokenId};
use serde::{Deserialize, Serialize};

/// One committed transaction in a principal's audit trail
///
/// Records are created once by the ledger and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Globally unique token id
    pub token_id: TokenId,
    /// Submitting principal
    pub principal: Principal,
    /// Ledger-assigned commit time in Unix milliseconds
    pub timestamp: u64,
    /// Classification label, e.g. `PAYMENT`
    pub transaction_type: String,
    /// Amount in the lowest denomination
    pub amount: u64,
    /// SHA-256 of the submitted document
    pub content_hash: ContentHash,
    /// Content store reference for the document
    pub content_pointer: ContentPointer,
    /// Always true for persisted records
    pub verified: bool,
}

/// Arguments of an append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRequest {
    /// Token id, doubling as idempotency key
    pub token_id: TokenId,
    /// Classification label
    pub transaction_type: String,
    /// Amount in the lowest denomination
    pub amount: u64,
    /// Digest of the document
    pub content_hash: ContentHash,
    /// Content store reference
    pub content_pointer: ContentPointer,
    /// Submitting principal
    pub principal: Principal,
}

impl AppendRequest {
    /// Whether an existing record is what this request would have produced
    ///
    /// Used to recognise a retried append whose first attempt already landed.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        record.token_id == self.token_id
            && record.principal == self.principal
            && record.content_hash == self.content_hash
            && record.amount == self.amount
            && record.transaction_type == self.transaction_type.trim()
    }
}

/// Proof of a committed append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Sequence number of the `TransactionLogged` event
    pub sequence: u64,
    /// The committed record
    pub record: TransactionRecord,
}

/// Per-principal view combining registry flag and record count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalStats {
    /// The principal
    pub principal: Principal,
    /// Current authorization flag
    pub authorized: bool,
    /// Number of committed records
    pub transaction_count: u64,
}
