//! Durable journal of ledger mutations
//!
//! Every state change is written to the journal before it is applied in
//! memory. On start the ledger replays the journal to rebuild its state, so a
//! mutation the journal refused never becomes visible.
//!
//! [`FileJournal`] stores one JSON object per line. A failed append is cut
//! back to the previous length before the error is returned, so a refused
//! mutation leaves no bytes behind. A torn final line (crash mid-write) is
//! dropped on open; corruption anywhere else is fatal.

use crate::record::TransactionRecord;
use attest_authorization::AuthorizationChange;
use attest_core::{AttestError, Principal, Service};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One durable mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    /// One or more authorization flags were set together
    Authorized {
        /// The applied changes, in order
        changes: Vec<AuthorizationChange>,
    },
    /// A record was appended
    Appended {
        /// The committed record
        record: TransactionRecord,
    },
    /// The pause flag changed
    PauseChanged {
        /// New flag
        paused: bool,
        /// Administrator responsible
        by: Principal,
    },
}

/// Journal failures
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Underlying storage failed
    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A line in the middle of the journal could not be decoded
    #[error("journal corrupt at line {line}: {message}")]
    Corrupt {
        /// 1-based line number
        line: usize,
        /// Decoder message
        message: String,
    },
    /// Entry could not be encoded
    #[error("journal encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// Writes are refused
    #[error("journal unavailable: {0}")]
    Unavailable(String),
}

impl From<JournalError> for AttestError {
    fn from(err: JournalError) -> Self {
        match err {
            JournalError::Corrupt { .. } => AttestError::internal(err.to_string()),
            other => AttestError::transient(Service::Ledger, other.to_string()),
        }
    }
}

/// Append-only store of [`JournalEntry`] values
pub trait LedgerJournal: Send + Sync + fmt::Debug {
    /// Durably append one entry
    fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Every entry written so far, in order
    fn replay(&self) -> Result<Vec<JournalEntry>, JournalError>;
}

/// In-memory journal; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of entries written
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LedgerJournal for MemoryJournal {
    fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(JournalError::Unavailable("writes disabled".to_string()));
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(self.entries.lock().clone())
    }
}

/// JSON-lines journal on the local filesystem
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    poisoned: Option<String>,
}

impl FileJournal {
    /// Open or create the journal, dropping a torn final line
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let scan = scan(&content)?;

        if scan.valid_len < content.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = content.len() - scan.valid_len,
                "dropping torn journal tail"
            );
            file.set_len(scan.valid_len as u64)?;
        } else if scan.needs_newline {
            file.write_all(b"\n")?;
        }
        file.sync_data()?;

        tracing::debug!(path = %path.display(), entries = scan.entries.len(), "journal opened");
        Ok(Self {
            path,
            file,
            poisoned: None,
        })
    }

    /// Location of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerJournal for FileJournal {
    fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if let Some(reason) = &self.poisoned {
            return Err(JournalError::Unavailable(reason.clone()));
        }
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let result = append_line(&mut self.file, &line);
        if let Err(JournalError::Unavailable(reason)) = &result {
            tracing::error!(path = %self.path.display(), %reason, "journal refusing further writes");
            self.poisoned = Some(reason.clone());
        }
        result
    }

    fn replay(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(scan(&content)?.entries)
    }
}

/// File operations an append needs
trait JournalFile: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalFile for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write and sync `line`, or leave the file at its previous length
///
/// `Io` means nothing was kept. `Unavailable` means the rollback failed too
/// and the file may hold part of the line.
fn append_line<F: JournalFile>(file: &mut F, line: &[u8]) -> Result<(), JournalError> {
    let start = file.current_len()?;
    let Err(write_error) = file.write_all(line).and_then(|()| file.sync()) else {
        return Ok(());
    };
    match file.truncate(start).and_then(|()| file.sync()) {
        Ok(()) => {
            tracing::warn!(error = %write_error, "journal append rolled back");
            Err(JournalError::Io(write_error))
        }
        Err(rollback_error) => Err(JournalError::Unavailable(format!(
            "append failed ({write_error}) and rollback failed ({rollback_error})"
        ))),
    }
}

struct Scan {
    entries: Vec<JournalEntry>,
    valid_len: usize,
    needs_newline: bool,
}

fn scan(content: &str) -> Result<Scan, JournalError> {
    let mut entries = Vec::new();
    let mut offset = 0;
    let mut lines = content.split_inclusive('\n').enumerate().peekable();

    while let Some((index, raw)) = lines.next() {
        let is_last = lines.peek().is_none();
        let text = raw.trim_end_matches('\n');
        if text.trim().is_empty() {
            offset += raw.len();
            continue;
        }
        match serde_json::from_str::<JournalEntry>(text) {
            Ok(entry) => {
                entries.push(entry);
                offset += raw.len();
            }
            Err(_) if is_last => {
                return Ok(Scan {
                    entries,
                    valid_len: offset,
                    needs_newline: false,
                });
            }
            Err(e) => {
                return Err(JournalError::Corrupt {
                    line: index + 1,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(Scan {
        entries,
        valid_len: offset,
        needs_newline: !content.is_empty() && !content.ends_with('\n'),
    })
}
