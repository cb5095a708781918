//! Orphan reconciliation against a real ledger sequencer.

use attest_core::config::{PipelineConfig, ReconcileConfig};
use attest_core::{
    content_hash, LedgerClock, ReasonCode, RetryPolicy, TokenId, TransactionType,
};
use attest_ledger::{LedgerClient, LedgerHandle};
use attest_pipeline::{
    CommitPipeline, OrphanBacklog, OrphanEntry, OrphanReason, OrphanStatus, ReconcileReport,
    Reconciler, Submission,
};
use attest_store::ContentStoreClient;
use attest_testkit::{self as kit, FlakyContentStore, FlakyLedger, ManualClock};
use std::sync::Arc;
use std::time::Duration;

const DEADLINE_SECS: u64 = 300;

struct Harness {
    ledger: FlakyLedger<LedgerHandle>,
    backlog: OrphanBacklog,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new() -> Self {
        kit::init_tracing();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let handle = kit::ledger_with_clock(clock.clone(), &[kit::principal(1)]).await;
        Self {
            ledger: FlakyLedger::new(handle),
            backlog: OrphanBacklog::new(),
            clock,
        }
    }

    fn reconciler(&self, max_attempts: u32) -> Reconciler<FlakyLedger<LedgerHandle>> {
        let config = ReconcileConfig {
            deadline_secs: DEADLINE_SECS,
            interval_secs: 60,
            max_attempts,
            backlog_path: None,
        };
        Reconciler::new(self.ledger.clone(), self.backlog.clone(), config)
            .with_call_timeout(Duration::from_secs(2))
            .with_clock(self.clock.clone())
    }

    fn pipeline(&self) -> CommitPipeline<FlakyContentStore, FlakyLedger<LedgerHandle>> {
        let config = PipelineConfig {
            store_retry: RetryPolicy::none(),
            ledger_retry: RetryPolicy::fixed(Duration::from_millis(5)).with_max_attempts(2),
            ledger_call_timeout_ms: 2_000,
        };
        CommitPipeline::new(
            ContentStoreClient::new(FlakyContentStore::default(), Duration::from_secs(2)),
            self.ledger.clone(),
            config,
        )
        .with_backlog(self.backlog.clone())
        .with_clock(self.clock.clone())
    }

    fn file(&self, token: &str, seed: u64, reason: OrphanReason) -> OrphanEntry {
        let request = kit::append_request(
            token,
            &kit::principal(1),
            content_hash(&kit::document(seed, 64)),
        );
        let entry = OrphanEntry::pending(&request, reason, self.clock.now_millis());
        self.backlog.record(entry.clone());
        entry
    }

    fn past_deadline(&self) -> u64 {
        self.clock.advance(Duration::from_secs(DEADLINE_SECS));
        self.clock.now_millis()
    }
}

fn submission(token: &str) -> Submission {
    Submission::new(
        TokenId::new(token),
        kit::principal(1),
        TransactionType::Payment,
        990,
        kit::document(42, 256),
    )
}

#[tokio::test]
async fn entries_inside_the_deadline_are_left_alone() {
    let h = Harness::new().await;
    h.file("T1", 1, OrphanReason::LedgerUnavailable);

    let report = h.reconciler(5).reconcile_once(h.clock.now_millis() + 1_000).await;
    assert_eq!(
        report,
        ReconcileReport {
            not_due: 1,
            ..ReconcileReport::default()
        }
    );
    assert_eq!(h.ledger.lookup_calls(), 0);
    assert_eq!(h.backlog.pending().len(), 1);
}

#[tokio::test]
async fn unavailable_ledger_orphan_is_appended_once_the_ledger_returns() {
    let h = Harness::new().await;
    let pipeline = h.pipeline();
    h.ledger.fail_next_appends(2);
    let sub = submission("PAY-1");

    let err = pipeline.submit(sub.clone()).await.unwrap_err();
    let pointer = err.orphan().cloned().unwrap();

    let report = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(report.examined, 1);
    assert_eq!(report.recovered, 1);

    let record = h.ledger.inner().verify(&sub.token_id, &sub.principal).unwrap();
    assert_eq!(record.content_pointer, pointer);
    assert_eq!(record.content_hash, content_hash(&sub.document));
    assert_eq!(
        h.backlog.get(&sub.token_id).unwrap().status,
        OrphanStatus::Recovered
    );

    // Settled entries are not looked at again.
    let again = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(again, ReconcileReport::default());
}

#[tokio::test]
async fn orphan_whose_record_already_landed_is_recovered_without_appending() {
    let h = Harness::new().await;
    let entry = h.file("T1", 1, OrphanReason::Cancelled);
    h.ledger.inner().append(entry.append_request()).await.unwrap();
    let appends_before = h.ledger.append_calls();

    let report = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(report.recovered, 1);
    assert_eq!(h.ledger.append_calls(), appends_before);
    assert_eq!(h.ledger.inner().total_transactions(), 1);
}

#[tokio::test]
async fn token_taken_by_another_record_is_abandoned() {
    let h = Harness::new().await;
    let entry = h.file("T1", 1, OrphanReason::LedgerUnavailable);
    let other = kit::append_request("T1", &kit::principal(1), content_hash(b"something else"));
    h.ledger.inner().append(other).await.unwrap();

    let report = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(report.abandoned, 1);
    let settled = h.backlog.get(&entry.token_id).unwrap();
    assert_eq!(settled.status, OrphanStatus::Abandoned);
    assert!(settled.last_error.is_some());
}

#[tokio::test]
async fn two_documents_under_one_token_are_settled_separately() {
    let h = Harness::new().await;
    let a = h.file("T1", 1, OrphanReason::LedgerUnavailable);
    let b = h.file("T1", 2, OrphanReason::LedgerUnavailable);
    assert_eq!(h.backlog.len(), 2);

    let report = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(report.examined, 2);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.abandoned, 1);

    let bound = h
        .ledger
        .inner()
        .verify(&a.token_id, &a.principal)
        .unwrap()
        .content_pointer;
    for entry in h.backlog.for_token(&a.token_id) {
        let expected = if entry.content_pointer == bound {
            OrphanStatus::Recovered
        } else {
            OrphanStatus::Abandoned
        };
        assert_eq!(entry.status, expected);
    }
    assert!(bound == a.content_pointer || bound == b.content_pointer);
}

#[tokio::test]
async fn deterministic_rejection_is_abandoned_without_ledger_calls() {
    let h = Harness::new().await;
    h.file(
        "T1",
        1,
        OrphanReason::LedgerRejected {
            code: ReasonCode::PrincipalUnauthorized,
        },
    );

    let report = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(report.abandoned, 1);
    assert_eq!(h.ledger.lookup_calls(), 0);
    assert_eq!(h.ledger.append_calls(), 0);
}

#[tokio::test]
async fn paused_rejection_waits_for_unpause() {
    let h = Harness::new().await;
    let pipeline = h.pipeline();
    h.ledger.inner().pause(&kit::admin()).await.unwrap();
    let sub = submission("PAY-1");
    let err = pipeline.submit(sub.clone()).await.unwrap_err();
    assert_eq!(err.reason(), ReasonCode::SystemPaused);

    let reconciler = h.reconciler(5);
    let report = reconciler.reconcile_once(h.past_deadline()).await;
    assert_eq!(report.retry_later, 1);
    let entry = h.backlog.get(&sub.token_id).unwrap();
    assert_eq!(entry.attempts, 1);
    assert_eq!(entry.status, OrphanStatus::Pending);

    h.ledger.inner().unpause(&kit::admin()).await.unwrap();
    let report = reconciler.reconcile_once(h.past_deadline()).await;
    assert_eq!(report.recovered, 1);
    assert!(h.ledger.inner().verify(&sub.token_id, &sub.principal).is_some());
}

#[tokio::test]
async fn attempts_are_bounded() {
    let h = Harness::new().await;
    let entry = h.file("T1", 1, OrphanReason::LedgerUnavailable);
    h.ledger.fail_next_appends(100);
    let reconciler = h.reconciler(2);

    let first = reconciler.reconcile_once(h.past_deadline()).await;
    assert_eq!(first.retry_later, 1);
    let pending = h.backlog.get(&entry.token_id).unwrap();
    assert_eq!(pending.attempts, 1);
    assert!(pending.last_error.is_some());

    let second = reconciler.reconcile_once(h.past_deadline()).await;
    assert_eq!(second.abandoned, 1);
    let settled = h.backlog.get(&entry.token_id).unwrap();
    assert_eq!(settled.status, OrphanStatus::Abandoned);
    assert_eq!(settled.attempts, 2);
    assert_eq!(h.ledger.inner().total_transactions(), 0);
}

#[tokio::test]
async fn failed_probe_counts_as_an_attempt() {
    let h = Harness::new().await;
    let entry = h.file("T1", 1, OrphanReason::LedgerUnavailable);
    h.ledger.fail_next_lookups(1);

    let report = h.reconciler(5).reconcile_once(h.past_deadline()).await;
    assert_eq!(report.retry_later, 1);
    assert_eq!(h.ledger.append_calls(), 0);
    assert_eq!(h.backlog.get(&entry.token_id).unwrap().attempts, 1);
}

#[tokio::test]
async fn run_reconciles_on_the_first_tick_and_stops_on_shutdown() {
    let h = Harness::new().await;
    h.file("T1", 1, OrphanReason::LedgerUnavailable);
    h.clock.advance(Duration::from_secs(DEADLINE_SECS));

    let reconciler = h.reconciler(5);
    let total = reconciler
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;
    assert_eq!(total.recovered, 1);
    assert_eq!(h.ledger.inner().total_transactions(), 1);
}

#[tokio::test]
async fn persisted_backlog_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orphans.json");
    let h = Harness::new().await;
    let backlog = OrphanBacklog::open(&path).unwrap();
    let request = kit::append_request("T1", &kit::principal(1), content_hash(b"doc"));
    backlog.record(OrphanEntry::pending(
        &request,
        OrphanReason::LedgerUnavailable,
        h.clock.now_millis(),
    ));
    drop(backlog);

    let reopened = OrphanBacklog::open(&path).unwrap();
    let reconciler = Reconciler::new(h.ledger.clone(), reopened, ReconcileConfig::default());
    let report = reconciler.reconcile_once(h.past_deadline()).await;
    assert_eq!(report.recovered, 1);

    let after = OrphanBacklog::open(&path).unwrap();
    assert_eq!(
        after.get(&request.token_id).unwrap().status,
        OrphanStatus::Recovered
    );
}
