//! Two-step commit: upload the document, then bind it into the ledger
//!
//! The pipeline owns retries. Transient failures of either collaborator are
//! retried with the configured policy; everything else ends the submission in
//! a terminal state right away.
//!
//! The core convergence rule: a retried append that comes back as a duplicate
//! token is looked up, and if the existing record is exactly what this
//! submission would have written, the submission is `Committed`. The first
//! attempt landed and only its acknowledgement was lost.

use crate::error::PipelineError;
use crate::locks::KeyLocks;
use crate::orphan::{OrphanBacklog, OrphanEntry, OrphanGuard, OrphanReason};
use crate::state::SubmissionState;
use crate::submission::{CommitReceipt, Submission};
use crate::tracker::SubmissionTracker;
use attest_core::config::PipelineConfig;
use attest_core::{
    content_hash, AttestError, AttestResult, ContentHash, ContentPointer, LedgerClock, Service,
    SystemClock, TokenId,
};
use attest_ledger::{AppendRequest, LedgerClient, Receipt, TransactionRecord};
use attest_store::{ContentStore, ContentStoreClient, StoreError, StoredContent};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Commit pipeline over a content store and a ledger
#[derive(Debug)]
pub struct CommitPipeline<S, L> {
    store: ContentStoreClient<S>,
    ledger: L,
    config: PipelineConfig,
    locks: KeyLocks,
    tracker: SubmissionTracker,
    backlog: OrphanBacklog,
    clock: Arc<dyn LedgerClock>,
}

enum Settled {
    Fresh(Receipt),
    Replayed(TransactionRecord),
}

impl<S, L> CommitPipeline<S, L>
where
    S: ContentStore,
    L: LedgerClient,
{
    /// Create a pipeline with an in-memory orphan backlog
    pub fn new(store: ContentStoreClient<S>, ledger: L, config: PipelineConfig) -> Self {
        Self {
            store,
            ledger,
            config,
            locks: KeyLocks::new(),
            tracker: SubmissionTracker::new(),
            backlog: OrphanBacklog::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// File orphans into `backlog`
    pub fn with_backlog(mut self, backlog: OrphanBacklog) -> Self {
        self.backlog = backlog;
        self
    }

    /// Timestamp orphans with `clock`
    pub fn with_clock(mut self, clock: Arc<dyn LedgerClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Submission progress
    pub fn tracker(&self) -> &SubmissionTracker {
        &self.tracker
    }

    /// Orphan backlog
    pub fn backlog(&self) -> &OrphanBacklog {
        &self.backlog
    }

    /// The ledger client
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The content store client
    pub fn store(&self) -> &ContentStoreClient<S> {
        &self.store
    }

    /// Run a submission to a terminal state
    ///
    /// Submissions sharing a token id are serialized. Dropping the returned
    /// future after the document was stored files a `Cancelled` orphan.
    pub async fn submit(&self, submission: Submission) -> Result<CommitReceipt, PipelineError> {
        let span = tracing::info_span!(
            "submission",
            token_id = %submission.token_id,
            principal = %submission.principal,
        );
        self.run(submission).instrument(span).await
    }

    async fn run(&self, submission: Submission) -> Result<CommitReceipt, PipelineError> {
        let token_id = submission.token_id.clone();
        let _key = self.locks.lock(&token_id).await;
        self.tracker.transition(&token_id, SubmissionState::Received);

        if let Err(source) = submission.validate() {
            return Err(self.reject(&token_id, source, None));
        }

        let hash = content_hash(&submission.document);
        self.tracker.transition(&token_id, SubmissionState::HashComputed);
        let fingerprint = submission
            .fingerprint(&hash)
            .map_err(|source| self.reject(&token_id, source, None))?;

        // A record may already exist from an earlier run whose reply was lost.
        if let Some(existing) = self.probe(&token_id).await {
            let request = submission.append_request(hash, existing.content_pointer.clone());
            if request.matches(&existing) {
                tracing::info!("already committed by an earlier run, skipping upload");
                return Ok(self.commit(Settled::Replayed(existing), fingerprint));
            }
            let source = AttestError::conflict(token_id.as_str());
            return Err(self.reject(&token_id, source, None));
        }

        let stored = self.upload(&token_id, &submission.document, hash).await?;
        self.tracker.transition(&token_id, SubmissionState::Stored);

        let request = submission.append_request(stored.content_hash, stored.content_pointer);
        let guard = OrphanGuard::arm(
            self.backlog.clone(),
            OrphanEntry::pending(&request, OrphanReason::Cancelled, self.clock.now_millis()),
        );
        self.tracker
            .transition(&token_id, SubmissionState::LedgerPending);

        let (result, attempts) = self.append_with_retry(&request).await;
        match result {
            Ok(settled) => {
                guard.disarm();
                Ok(self.commit(settled, fingerprint))
            }
            Err(source) if source.is_retryable() => {
                guard.file(OrphanReason::LedgerUnavailable);
                self.tracker
                    .transition(&token_id, SubmissionState::LedgerFailed);
                tracing::warn!(attempts, error = %source, "ledger append failed, document orphaned");
                Err(PipelineError::LedgerFailed {
                    token_id,
                    source,
                    content_pointer: request.content_pointer,
                    attempts,
                })
            }
            Err(source) => {
                guard.file(OrphanReason::LedgerRejected {
                    code: source.reason(),
                });
                Err(self.reject(&token_id, source, Some(request.content_pointer)))
            }
        }
    }

    async fn probe(&self, token_id: &TokenId) -> Option<TransactionRecord> {
        match self.lookup(token_id).await {
            Ok(found) => found,
            Err(e) => {
                // The append path settles it; a failed probe only costs an upload.
                tracing::warn!(error = %e, "pre-upload ledger probe failed");
                None
            }
        }
    }

    async fn upload(
        &self,
        token_id: &TokenId,
        document: &[u8],
        hash: ContentHash,
    ) -> Result<StoredContent, PipelineError> {
        let outcome = self
            .config
            .store_retry
            .execute(
                |attempt| {
                    if attempt > 0 {
                        tracing::warn!(attempt, "retrying upload");
                    }
                    self.store.store(document)
                },
                StoreError::is_retryable,
            )
            .await;

        let attempts = outcome.attempts;
        match outcome.into_result() {
            Ok(stored) => {
                debug_assert_eq!(stored.content_hash, hash);
                Ok(stored)
            }
            Err(e) if e.is_retryable() => {
                self.tracker
                    .transition(token_id, SubmissionState::StoreFailed);
                tracing::warn!(attempts, error = %e, "upload failed, nothing written to the ledger");
                Err(PipelineError::StoreFailed {
                    token_id: token_id.clone(),
                    source: e.into(),
                    attempts,
                })
            }
            Err(e) => Err(self.reject(token_id, e.into(), None)),
        }
    }

    async fn append_with_retry(&self, request: &AppendRequest) -> (AttestResult<Settled>, u32) {
        let outcome = self
            .config
            .ledger_retry
            .execute(
                |attempt| async move {
                    if attempt > 0 {
                        tracing::warn!(attempt, "retrying ledger append");
                    }
                    match self.append_once(request.clone()).await {
                        Ok(receipt) => Ok(Settled::Fresh(receipt)),
                        // Either our own earlier write or a different submission.
                        Err(AttestError::Conflict { .. }) => self.settle_conflict(request).await,
                        Err(e) => Err(e),
                    }
                },
                AttestError::is_retryable,
            )
            .await;
        let attempts = outcome.attempts;
        (outcome.into_result(), attempts)
    }

    async fn settle_conflict(&self, request: &AppendRequest) -> AttestResult<Settled> {
        match self.lookup(&request.token_id).await? {
            Some(existing) if request.matches(&existing) => {
                tracing::info!("duplicate token is our own earlier write, converging");
                Ok(Settled::Replayed(existing))
            }
            _ => Err(AttestError::conflict(request.token_id.as_str())),
        }
    }

    async fn append_once(&self, request: AppendRequest) -> AttestResult<Receipt> {
        let timeout = self.config.ledger_call_timeout();
        bounded(timeout, "append", self.ledger.append(request)).await
    }

    async fn lookup(&self, token_id: &TokenId) -> AttestResult<Option<TransactionRecord>> {
        let timeout = self.config.ledger_call_timeout();
        bounded(timeout, "lookup", self.ledger.lookup_by_token(token_id)).await
    }

    fn commit(&self, settled: Settled, fingerprint: ContentHash) -> CommitReceipt {
        let receipt = match settled {
            Settled::Fresh(receipt) => {
                CommitReceipt::from_record(receipt.record, Some(receipt.sequence), fingerprint)
            }
            Settled::Replayed(record) => CommitReceipt::from_record(record, None, fingerprint),
        };
        self.tracker
            .transition(&receipt.token_id, SubmissionState::Committed);
        tracing::info!(
            content_pointer = %receipt.content_pointer,
            timestamp = receipt.timestamp,
            replayed = receipt.replayed,
            "submission committed"
        );
        receipt
    }

    fn reject(
        &self,
        token_id: &TokenId,
        source: AttestError,
        orphaned: Option<ContentPointer>,
    ) -> PipelineError {
        self.tracker.transition(token_id, SubmissionState::Rejected);
        tracing::info!(reason = %source.reason(), field = ?source.field(), "submission rejected");
        PipelineError::Rejected {
            token_id: token_id.clone(),
            source,
            orphaned,
        }
    }
}

/// Apply a ledger call timeout; expiry is a transient failure
pub(crate) async fn bounded<T>(
    timeout: Duration,
    op: &str,
    call: impl std::future::Future<Output = AttestResult<T>>,
) -> AttestResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AttestError::transient(
            Service::Ledger,
            format!("{op} timed out after {timeout:?}"),
        )),
    }
}
