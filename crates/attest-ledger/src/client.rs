//! Caller-facing ledger boundary
//!
//! The commit pipeline and reconciler only see this trait, so tests can put a
//! fault-injecting double between them and the real ledger.

use crate::record::{AppendRequest, Receipt, TransactionRecord};
use async_trait::async_trait;
use attest_core::{AttestResult, ContentHash, Principal, TokenId};
use std::sync::Arc;

/// Asynchronous ledger operations available to any authenticated caller
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Append a record
    ///
    /// Returns `Transient` when the ledger could not be reached; the append
    /// may or may not have been applied in that case.
    async fn append(&self, request: AppendRequest) -> AttestResult<Receipt>;

    /// Global reverse lookup by token id
    async fn lookup_by_token(&self, token_id: &TokenId) -> AttestResult<Option<TransactionRecord>>;

    /// True iff the record exists for `principal` with exactly `expected` as hash
    async fn verify_integrity(
        &self,
        token_id: &TokenId,
        principal: &Principal,
        expected: &ContentHash,
    ) -> AttestResult<bool>;

    /// Full append-ordered history of `principal`
    async fn get_trail(&self, principal: &Principal) -> AttestResult<Vec<TransactionRecord>>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn append(&self, request: AppendRequest) -> AttestResult<Receipt> {
        (**self).append(request).await
    }

    async fn lookup_by_token(&self, token_id: &TokenId) -> AttestResult<Option<TransactionRecord>> {
        (**self).lookup_by_token(token_id).await
    }

    async fn verify_integrity(
        &self,
        token_id: &TokenId,
        principal: &Principal,
        expected: &ContentHash,
    ) -> AttestResult<bool> {
        (**self).verify_integrity(token_id, principal, expected).await
    }

    async fn get_trail(&self, principal: &Principal) -> AttestResult<Vec<TransactionRecord>> {
        (**self).get_trail(principal).await
    }
}
