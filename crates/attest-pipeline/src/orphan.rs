//! Reconciliation backlog of stored documents with no committed record
//!
//! An orphan is filed whenever a document was uploaded but the submission did
//! not reach `Committed`: the ledger rejected the append, the ledger stayed
//! unreachable, or the submission was cancelled mid-flight. Documents are
//! never discarded; the [`Reconciler`](crate::Reconciler) later recovers or
//! abandons each entry.
//!
//! The backlog can be persisted to a JSON file, rewritten on every change.

use attest_core::{AttestResult, ContentHash, ContentPointer, Principal, ReasonCode, TokenId};
use attest_ledger::AppendRequest;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Why a document ended up in the backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrphanReason {
    /// The ledger deterministically refused the append
    LedgerRejected {
        /// Ledger reason code
        code: ReasonCode,
    },
    /// Ledger retries were exhausted
    LedgerUnavailable,
    /// The submission was dropped after upload
    Cancelled,
}

/// Reconciliation progress of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanStatus {
    /// Waiting for reconciliation
    Pending,
    /// A matching ledger record now exists
    Recovered,
    /// Given up; the document stays in the store unreferenced
    Abandoned,
}

/// One stored document lacking a committed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanEntry {
    /// Idempotency key of the submission
    pub token_id: TokenId,
    /// Submitter
    pub principal: Principal,
    /// Classification label
    pub transaction_type: String,
    /// Amount
    pub amount: u64,
    /// Canonical document hash
    pub content_hash: ContentHash,
    /// Where the document lives
    pub content_pointer: ContentPointer,
    /// Why the entry exists
    pub reason: OrphanReason,
    /// When the entry was filed, Unix milliseconds
    pub recorded_at: u64,
    /// Reconciliation progress
    pub status: OrphanStatus,
    /// Reconciliation attempts so far
    pub attempts: u32,
    /// Last error seen while reconciling
    pub last_error: Option<String>,
}

impl OrphanEntry {
    /// Build a pending entry for the append that failed
    pub fn pending(request: &AppendRequest, reason: OrphanReason, recorded_at: u64) -> Self {
        Self {
            token_id: request.token_id.clone(),
            principal: request.principal.clone(),
            transaction_type: request.transaction_type.clone(),
            amount: request.amount,
            content_hash: request.content_hash,
            content_pointer: request.content_pointer.clone(),
            reason,
            recorded_at,
            status: OrphanStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    /// Backlog key of this entry
    pub fn key(&self) -> OrphanKey {
        (self.token_id.clone(), self.content_pointer.clone())
    }

    /// The append that would bind this document
    pub fn append_request(&self) -> AppendRequest {
        AppendRequest {
            token_id: self.token_id.clone(),
            transaction_type: self.transaction_type.clone(),
            amount: self.amount,
            content_hash: self.content_hash,
            content_pointer: self.content_pointer.clone(),
            principal: self.principal.clone(),
        }
    }
}

/// Backlog key: one entry per stored document of a token
pub type OrphanKey = (TokenId, ContentPointer);

/// Shared backlog; clones see the same entries
///
/// Entries are keyed by token id and content pointer, so a second document
/// orphaned under the same token sits next to the first rather than
/// replacing it.
#[derive(Debug, Clone, Default)]
pub struct OrphanBacklog {
    entries: Arc<Mutex<BTreeMap<OrphanKey, OrphanEntry>>>,
    path: Option<Arc<PathBuf>>,
}

impl OrphanBacklog {
    /// In-memory backlog
    pub fn new() -> Self {
        Self::default()
    }

    /// Backlog persisted at `path`, loading existing entries
    pub fn open(path: impl AsRef<Path>) -> AttestResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                let list: Vec<OrphanEntry> = serde_json::from_str(&content)?;
                list.into_iter().map(|e| (e.key(), e)).collect()
            }
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "orphan backlog loaded");
        Ok(Self {
            entries: Arc::new(Mutex::new(entries)),
            path: Some(Arc::new(path)),
        })
    }

    /// File an entry, replacing an earlier one only for the same document
    pub fn record(&self, entry: OrphanEntry) {
        tracing::warn!(
            token_id = %entry.token_id,
            content_pointer = %entry.content_pointer,
            reason = ?entry.reason,
            "orphaned document filed for reconciliation"
        );
        let mut entries = self.entries.lock();
        entries.insert(entry.key(), entry);
        self.persist(&entries);
    }

    /// Modify the entry under `key` in place; false when absent
    pub fn update(&self, key: &OrphanKey, f: impl FnOnce(&mut OrphanEntry)) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        f(entry);
        self.persist(&entries);
        true
    }

    /// Most recently filed entry for `token_id`
    pub fn get(&self, token_id: &TokenId) -> Option<OrphanEntry> {
        self.entries
            .lock()
            .values()
            .filter(|e| &e.token_id == token_id)
            .max_by_key(|e| e.recorded_at)
            .cloned()
    }

    /// Every entry filed for `token_id`, one per document
    pub fn for_token(&self, token_id: &TokenId) -> Vec<OrphanEntry> {
        self.entries
            .lock()
            .values()
            .filter(|e| &e.token_id == token_id)
            .cloned()
            .collect()
    }

    /// Entries still waiting for reconciliation
    pub fn pending(&self) -> Vec<OrphanEntry> {
        self.entries
            .lock()
            .values()
            .filter(|e| e.status == OrphanStatus::Pending)
            .cloned()
            .collect()
    }

    /// Every entry, ordered by token id then pointer
    pub fn entries(&self) -> Vec<OrphanEntry> {
        self.entries.lock().values().cloned().collect()
    }

    /// Number of entries in any status
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the backlog has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &BTreeMap<OrphanKey, OrphanEntry>) {
        let Some(path) = &self.path else {
            return;
        };
        let list: Vec<&OrphanEntry> = entries.values().collect();
        let result = serde_json::to_vec_pretty(&list)
            .map_err(std::io::Error::from)
            .and_then(|bytes| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let staging = path.with_extension("tmp");
                std::fs::write(&staging, bytes)?;
                std::fs::rename(&staging, path.as_path())
            });
        if let Err(e) = result {
            tracing::error!(path = %path.display(), error = %e, "failed to persist orphan backlog");
        }
    }
}

/// Files a `Cancelled` orphan if dropped while armed
///
/// Armed once the document is stored; disarmed when the submission reaches a
/// terminal state through normal control flow.
#[derive(Debug)]
pub struct OrphanGuard {
    backlog: OrphanBacklog,
    entry: Option<OrphanEntry>,
}

impl OrphanGuard {
    /// Arm a guard for `entry`
    pub fn arm(backlog: OrphanBacklog, entry: OrphanEntry) -> Self {
        Self {
            backlog,
            entry: Some(entry),
        }
    }

    /// Terminal state reached with nothing left behind
    pub fn disarm(mut self) {
        self.entry = None;
    }

    /// Terminal state reached with an orphan; file it with `reason`
    pub fn file(mut self, reason: OrphanReason) {
        if let Some(mut entry) = self.entry.take() {
            entry.reason = reason;
            self.backlog.record(entry);
        }
    }
}

impl Drop for OrphanGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.entry.take() {
            entry.reason = OrphanReason::Cancelled;
            self.backlog.record(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str) -> OrphanEntry {
        document_entry(token, "bafk9", 1_000)
    }

    fn document_entry(token: &str, pointer: &str, recorded_at: u64) -> OrphanEntry {
        let request = AppendRequest {
            token_id: TokenId::new(token),
            transaction_type: "PAYMENT".into(),
            amount: 5,
            content_hash: ContentHash::from_bytes([9; 32]),
            content_pointer: ContentPointer::new(pointer),
            principal: Principal::new("0xsme"),
        };
        OrphanEntry::pending(&request, OrphanReason::LedgerUnavailable, recorded_at)
    }

    #[test]
    fn test_guard_files_cancelled_on_drop() {
        let backlog = OrphanBacklog::new();
        {
            let _guard = OrphanGuard::arm(backlog.clone(), entry("T1"));
        }
        let filed = backlog.get(&TokenId::new("T1")).unwrap();
        assert_eq!(filed.reason, OrphanReason::Cancelled);
        assert_eq!(filed.status, OrphanStatus::Pending);
    }

    #[test]
    fn test_disarmed_guard_files_nothing() {
        let backlog = OrphanBacklog::new();
        OrphanGuard::arm(backlog.clone(), entry("T1")).disarm();
        assert!(backlog.is_empty());

        OrphanGuard::arm(backlog.clone(), entry("T2")).file(OrphanReason::LedgerRejected {
            code: ReasonCode::PrincipalUnauthorized,
        });
        assert_eq!(
            backlog.get(&TokenId::new("T2")).unwrap().reason,
            OrphanReason::LedgerRejected {
                code: ReasonCode::PrincipalUnauthorized
            }
        );
    }

    #[test]
    fn test_persisted_backlog_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/orphans.json");
        let backlog = OrphanBacklog::open(&path).unwrap();
        backlog.record(entry("T1"));
        backlog.record(entry("T2"));
        backlog.update(&entry("T1").key(), |e| e.status = OrphanStatus::Recovered);

        let reloaded = OrphanBacklog::open(&path).unwrap();
        assert_eq!(reloaded.entries(), backlog.entries());
        assert_eq!(reloaded.pending().len(), 1);
    }

    #[test]
    fn test_second_document_under_same_token_keeps_the_first() {
        let backlog = OrphanBacklog::new();
        let first = document_entry("T1", "bafk-first", 1_000);
        let second = document_entry("T1", "bafk-second", 2_000);
        backlog.record(first.clone());
        backlog.record(second.clone());

        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.get(&first.token_id).unwrap(), second);
        let pointers: Vec<_> = backlog
            .for_token(&first.token_id)
            .into_iter()
            .map(|e| e.content_pointer)
            .collect();
        assert_eq!(
            pointers,
            vec![first.content_pointer.clone(), second.content_pointer.clone()]
        );

        backlog.update(&first.key(), |e| e.status = OrphanStatus::Abandoned);
        assert_eq!(backlog.get(&first.token_id).unwrap().status, OrphanStatus::Pending);
        assert_eq!(backlog.pending(), vec![second]);
    }

    #[test]
    fn test_refiling_the_same_document_replaces_its_entry() {
        let backlog = OrphanBacklog::new();
        backlog.record(document_entry("T1", "bafk-doc", 1_000));
        backlog.record(document_entry("T1", "bafk-doc", 2_000));
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog.get(&TokenId::new("T1")).unwrap().recorded_at, 2_000);
    }
}
