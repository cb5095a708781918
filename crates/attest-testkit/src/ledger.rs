//! Fault-injecting ledger client
//!
//! Two failure shapes matter for the commit pipeline: the ledger was never
//! reached (nothing applied), and the ledger applied the append but the
//! acknowledgement was lost. [`FlakyLedger`] can produce both.

use async_trait::async_trait;
use attest_core::{AttestError, AttestResult, ContentHash, Principal, Service, TokenId};
use attest_ledger::{AppendRequest, LedgerClient, Receipt, TransactionRecord};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    unreachable_appends: AtomicU32,
    lost_acks: AtomicU32,
    failing_lookups: AtomicU32,
    hang_appends: AtomicBool,
    append_calls: AtomicU32,
    lookup_calls: AtomicU32,
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Wraps a [`LedgerClient`]; clones share faults and counters
#[derive(Debug, Clone)]
pub struct FlakyLedger<L> {
    inner: L,
    faults: Arc<Faults>,
}

impl<L> FlakyLedger<L> {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    /// The wrapped client
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Fail the next `count` appends before they reach the ledger
    pub fn fail_next_appends(&self, count: u32) {
        self.faults
            .unreachable_appends
            .store(count, Ordering::SeqCst);
    }

    /// Apply the next `count` appends but report a transient failure
    pub fn lose_next_acks(&self, count: u32) {
        self.faults.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` lookups
    pub fn fail_next_lookups(&self, count: u32) {
        self.faults.failing_lookups.store(count, Ordering::SeqCst);
    }

    /// Make appends never complete
    pub fn hang_appends(&self, hang: bool) {
        self.faults.hang_appends.store(hang, Ordering::SeqCst);
    }

    /// Append attempts seen, including failed ones
    pub fn append_calls(&self) -> u32 {
        self.faults.append_calls.load(Ordering::SeqCst)
    }

    /// Lookup attempts seen
    pub fn lookup_calls(&self) -> u32 {
        self.faults.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for FlakyLedger<L> {
    async fn append(&self, request: AppendRequest) -> AttestResult<Receipt> {
        self.faults.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.hang_appends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if take(&self.faults.unreachable_appends) {
            return Err(AttestError::transient(
                Service::Ledger,
                "injected: ledger unreachable",
            ));
        }
        let receipt = self.inner.append(request).await?;
        if take(&self.faults.lost_acks) {
            tracing::debug!(token_id = %receipt.record.token_id, "dropping acknowledgement");
            return Err(AttestError::transient(
                Service::Ledger,
                "injected: acknowledgement lost",
            ));
        }
        Ok(receipt)
    }

    async fn lookup_by_token(&self, token_id: &TokenId) -> AttestResult<Option<TransactionRecord>> {
        self.faults.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.faults.failing_lookups) {
            return Err(AttestError::transient(Service::Ledger, "injected: lookup failed"));
        }
        self.inner.lookup_by_token(token_id).await
    }

    async fn verify_integrity(
        &self,
        token_id: &TokenId,
        principal: &Principal,
        expected: &ContentHash,
    ) -> AttestResult<bool> {
        self.inner
            .verify_integrity(token_id, principal, expected)
            .await
    }

    async fn get_trail(&self, principal: &Principal) -> AttestResult<Vec<TransactionRecord>> {
        self.inner.get_trail(principal).await
    }
}
