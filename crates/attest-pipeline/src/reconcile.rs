//! Out-of-band reconciliation of orphaned documents
//!
//! Pending backlog entries older than the deadline are settled one by one:
//! a matching ledger record means the document is bound after all; otherwise
//! the append is retried a bounded number of times before the entry is
//! abandoned. Deterministic ledger rejections are abandoned immediately,
//! except a paused ledger, which is waited out.

use crate::orphan::{OrphanBacklog, OrphanEntry, OrphanReason, OrphanStatus};
use crate::pipeline::bounded;
use attest_core::config::ReconcileConfig;
use attest_core::{AttestError, LedgerClock, ReasonCode, SystemClock};
use attest_ledger::LedgerClient;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Default timeout applied to each ledger call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts from one or more reconciliation passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Entries old enough to be worked on
    pub examined: usize,
    /// Entries now bound to a ledger record
    pub recovered: usize,
    /// Entries given up on
    pub abandoned: usize,
    /// Entries left pending for a later pass
    pub retry_later: usize,
    /// Pending entries still inside the deadline
    pub not_due: usize,
}

impl ReconcileReport {
    fn absorb(&mut self, other: ReconcileReport) {
        self.examined += other.examined;
        self.recovered += other.recovered;
        self.abandoned += other.abandoned;
        self.retry_later += other.retry_later;
        self.not_due = other.not_due;
    }
}

enum Verdict {
    Recovered,
    Abandon(String),
    Retry(String),
}

/// Settles the orphan backlog against the ledger
#[derive(Debug)]
pub struct Reconciler<L> {
    ledger: L,
    backlog: OrphanBacklog,
    config: ReconcileConfig,
    call_timeout: Duration,
    clock: Arc<dyn LedgerClock>,
}

impl<L: LedgerClient> Reconciler<L> {
    /// Create a reconciler over `backlog`
    pub fn new(ledger: L, backlog: OrphanBacklog, config: ReconcileConfig) -> Self {
        Self {
            ledger,
            backlog,
            config,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }

    /// Timeout applied to each ledger call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Clock used by [`Reconciler::run`]
    pub fn with_clock(mut self, clock: Arc<dyn LedgerClock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backlog being reconciled
    pub fn backlog(&self) -> &OrphanBacklog {
        &self.backlog
    }

    /// One pass over every pending entry filed at least a deadline before `now_millis`
    pub async fn reconcile_once(&self, now_millis: u64) -> ReconcileReport {
        let deadline = u64::try_from(self.config.deadline().as_millis()).unwrap_or(u64::MAX);
        let mut report = ReconcileReport::default();

        for entry in self.backlog.pending() {
            if now_millis.saturating_sub(entry.recorded_at) < deadline {
                report.not_due += 1;
                continue;
            }
            report.examined += 1;

            match self.settle(&entry).await {
                Verdict::Recovered => {
                    self.backlog.update(&entry.key(), |e| {
                        e.status = OrphanStatus::Recovered;
                        e.last_error = None;
                    });
                    tracing::info!(token_id = %entry.token_id, "orphan recovered");
                    report.recovered += 1;
                }
                Verdict::Abandon(why) => {
                    self.abandon(&entry, why);
                    report.abandoned += 1;
                }
                Verdict::Retry(why) => {
                    let attempts = entry.attempts + 1;
                    if attempts >= self.config.max_attempts {
                        self.backlog.update(&entry.key(), |e| e.attempts = attempts);
                        self.abandon(&entry, format!("gave up after {attempts} attempts: {why}"));
                        report.abandoned += 1;
                    } else {
                        self.backlog.update(&entry.key(), |e| {
                            e.attempts = attempts;
                            e.last_error = Some(why.clone());
                        });
                        tracing::debug!(token_id = %entry.token_id, attempts, error = %why, "orphan left pending");
                        report.retry_later += 1;
                    }
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                recovered = report.recovered,
                abandoned = report.abandoned,
                retry_later = report.retry_later,
                "reconciliation pass finished"
            );
        }
        report
    }

    /// Reconcile on the configured interval until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> ReconcileReport {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = std::pin::pin!(shutdown);
        let mut total = ReconcileReport::default();

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    total.absorb(self.reconcile_once(self.clock.now_millis()).await);
                }
            }
        }
        tracing::debug!("reconciler stopped");
        total
    }

    async fn settle(&self, entry: &OrphanEntry) -> Verdict {
        if let OrphanReason::LedgerRejected { code } = entry.reason {
            if code != ReasonCode::SystemPaused {
                return Verdict::Abandon(format!("ledger rejected the append: {code}"));
            }
        }

        let request = entry.append_request();
        match self.lookup_matching(entry).await {
            Ok(Some(true)) => return Verdict::Recovered,
            Ok(Some(false)) => {
                return Verdict::Abandon("token id is bound to a different record".to_string())
            }
            Ok(None) => {}
            Err(e) => return Verdict::Retry(e.to_string()),
        }

        match bounded(self.call_timeout, "append", self.ledger.append(request)).await {
            Ok(_) => Verdict::Recovered,
            Err(AttestError::Conflict { .. }) => match self.lookup_matching(entry).await {
                Ok(Some(true)) => Verdict::Recovered,
                Ok(_) => Verdict::Abandon("token id is bound to a different record".to_string()),
                Err(e) => Verdict::Retry(e.to_string()),
            },
            Err(e @ AttestError::Paused) => Verdict::Retry(e.to_string()),
            Err(e) if e.is_retryable() => Verdict::Retry(e.to_string()),
            Err(e) => Verdict::Abandon(e.to_string()),
        }
    }

    /// `Some(true)` when a matching record exists, `Some(false)` for a foreign one
    async fn lookup_matching(&self, entry: &OrphanEntry) -> Result<Option<bool>, AttestError> {
        let found = bounded(
            self.call_timeout,
            "lookup",
            self.ledger.lookup_by_token(&entry.token_id),
        )
        .await?;
        Ok(found.map(|record| entry.append_request().matches(&record)))
    }

    fn abandon(&self, entry: &OrphanEntry, why: String) {
        tracing::warn!(
            token_id = %entry.token_id,
            content_pointer = %entry.content_pointer,
            reason = %why,
            "orphan abandoned"
        );
        self.backlog.update(&entry.key(), |e| {
            e.status = OrphanStatus::Abandoned;
            e.last_error = Some(why);
        });
    }
}
