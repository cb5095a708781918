//! Single-writer sequencer
//!
//! All mutations travel through one command queue drained by a dedicated
//! sequencer thread, which gives the ledger a single total order without any
//! locking protocol between writers. Reads bypass the queue and take a shared
//! lock on the state, so they always observe the last committed mutation and
//! never an in-flight one.

use crate::client::LedgerClient;
use crate::event::EventEnvelope;
use crate::journal::FileJournal;
use crate::record::{AppendRequest, PrincipalStats, Receipt, TransactionRecord};
use crate::state::Ledger;
use async_trait::async_trait;
use attest_authorization::AuthorizationChange;
use attest_core::config::LedgerConfig;
use attest_core::{AttestError, AttestResult, ContentHash, Principal, Service, TokenId};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Depth of the command queue in front of the sequencer
pub const COMMAND_QUEUE_DEPTH: usize = 256;

type Reply<T> = oneshot::Sender<AttestResult<T>>;

enum Command {
    Append {
        request: AppendRequest,
        reply: Reply<Receipt>,
    },
    Authorize {
        caller: Principal,
        principal: Principal,
        authorized: bool,
        reply: Reply<AuthorizationChange>,
    },
    BatchAuthorize {
        caller: Principal,
        principals: Vec<Principal>,
        statuses: Vec<bool>,
        reply: Reply<Vec<AuthorizationChange>>,
    },
    SetPaused {
        caller: Principal,
        paused: bool,
        reply: Reply<()>,
    },
}

/// Starts sequencers
pub struct LedgerService;

impl LedgerService {
    /// Hand `ledger` to a new sequencer thread
    ///
    /// The thread stops once every handle has been dropped.
    pub fn start(ledger: Ledger) -> AttestResult<LedgerHandle> {
        let state = Arc::new(RwLock::new(ledger));
        let (commands, queue) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let writer_state = Arc::clone(&state);
        std::thread::Builder::new()
            .name("attest-ledger-sequencer".to_string())
            .spawn(move || sequence(&writer_state, queue))
            .map_err(|e| AttestError::internal(format!("failed to start sequencer: {e}")))?;

        tracing::debug!("ledger sequencer started");
        Ok(LedgerHandle { commands, state })
    }

    /// Open the ledger described by `config` and start its sequencer
    pub fn open(config: &LedgerConfig) -> AttestResult<LedgerHandle> {
        let builder = Ledger::builder(config.administrator.clone())
            .event_capacity(config.event_channel_capacity);
        let ledger = match &config.journal_path {
            Some(path) => builder.journal(FileJournal::open(path)?).open()?,
            None => builder.open()?,
        };
        Self::start(ledger)
    }
}

fn sequence(state: &RwLock<Ledger>, mut queue: mpsc::Receiver<Command>) {
    while let Some(command) = queue.blocking_recv() {
        let mut ledger = state.write();
        // A dropped reply means the caller gave up; the mutation still stands.
        match command {
            Command::Append { request, reply } => {
                let _ = reply.send(ledger.append(request));
            }
            Command::Authorize {
                caller,
                principal,
                authorized,
                reply,
            } => {
                let _ = reply.send(ledger.authorize(&caller, &principal, authorized));
            }
            Command::BatchAuthorize {
                caller,
                principals,
                statuses,
                reply,
            } => {
                let _ = reply.send(ledger.batch_authorize(&caller, &principals, &statuses));
            }
            Command::SetPaused {
                caller,
                paused,
                reply,
            } => {
                let result = if paused {
                    ledger.pause(&caller)
                } else {
                    ledger.unpause(&caller)
                };
                let _ = reply.send(result);
            }
        }
    }
    tracing::debug!("ledger sequencer stopped");
}

/// Cloneable handle to a running ledger
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<Ledger>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Append { .. } => "Append",
            Self::Authorize { .. } => "Authorize",
            Self::BatchAuthorize { .. } => "BatchAuthorize",
            Self::SetPaused { .. } => "SetPaused",
        };
        f.write_str(name)
    }
}

impl LedgerHandle {
    async fn submit<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> AttestResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| AttestError::transient(Service::Ledger, "sequencer stopped"))?;
        response
            .await
            .map_err(|_| AttestError::transient(Service::Ledger, "sequencer dropped the reply"))?
    }

    /// Set one principal's authorization flag
    pub async fn authorize(
        &self,
        caller: &Principal,
        principal: &Principal,
        authorized: bool,
    ) -> AttestResult<AuthorizationChange> {
        self.submit(|reply| Command::Authorize {
            caller: caller.clone(),
            principal: principal.clone(),
            authorized,
            reply,
        })
        .await
    }

    /// Set several flags atomically
    pub async fn batch_authorize(
        &self,
        caller: &Principal,
        principals: &[Principal],
        statuses: &[bool],
    ) -> AttestResult<Vec<AuthorizationChange>> {
        self.submit(|reply| Command::BatchAuthorize {
            caller: caller.clone(),
            principals: principals.to_vec(),
            statuses: statuses.to_vec(),
            reply,
        })
        .await
    }

    /// Suspend appends
    pub async fn pause(&self, caller: &Principal) -> AttestResult<()> {
        self.submit(|reply| Command::SetPaused {
            caller: caller.clone(),
            paused: true,
            reply,
        })
        .await
    }

    /// Resume appends
    pub async fn unpause(&self, caller: &Principal) -> AttestResult<()> {
        self.submit(|reply| Command::SetPaused {
            caller: caller.clone(),
            paused: false,
            reply,
        })
        .await
    }

    /// Run `f` against a consistent snapshot of the ledger
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&*self.state.read())
    }

    /// The record for `token_id` if it belongs to `principal`
    pub fn verify(&self, token_id: &TokenId, principal: &Principal) -> Option<TransactionRecord> {
        self.read(|ledger| ledger.verify(token_id, principal).cloned())
    }

    /// Number of records committed by `principal`
    pub fn transaction_count(&self, principal: &Principal) -> u64 {
        self.read(|ledger| ledger.transaction_count(principal))
    }

    /// Number of records in the whole ledger
    pub fn total_transactions(&self) -> u64 {
        self.read(Ledger::total_transactions)
    }

    /// Authorization flag and record count for `principal`
    pub fn stats(&self, principal: &Principal) -> PrincipalStats {
        self.read(|ledger| ledger.stats(principal))
    }

    /// Whether appends are suspended
    pub fn is_paused(&self) -> bool {
        self.read(Ledger::is_paused)
    }

    /// Pure authorization lookup
    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.read(|ledger| ledger.is_authorized(principal))
    }

    /// The administrative identity
    pub fn administrator(&self) -> Principal {
        self.read(|ledger| ledger.administrator().clone())
    }

    /// Events after `sequence`
    pub fn events_since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.read(|ledger| ledger.events_since(sequence))
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.read(Ledger::subscribe)
    }
}

#[async_trait]
impl LedgerClient for LedgerHandle {
    async fn append(&self, request: AppendRequest) -> AttestResult<Receipt> {
        self.submit(|reply| Command::Append { request, reply }).await
    }

    async fn lookup_by_token(&self, token_id: &TokenId) -> AttestResult<Option<TransactionRecord>> {
        Ok(self.read(|ledger| ledger.lookup_by_token(token_id).cloned()))
    }

    async fn verify_integrity(
        &self,
        token_id: &TokenId,
        principal: &Principal,
        expected: &ContentHash,
    ) -> AttestResult<bool> {
        Ok(self.read(|ledger| ledger.verify_integrity(token_id, principal, expected)))
    }

    async fn get_trail(&self, principal: &Principal) -> AttestResult<Vec<TransactionRecord>> {
        self.read(|ledger| ledger.get_trail(principal).map(<[_]>::to_vec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{ContentPointer, ReasonCode};

    fn admin() -> Principal {
        Principal::new("0xadmin")
    }

    fn request(token: &str, principal: &Principal) -> AppendRequest {
        AppendRequest {
            token_id: TokenId::new(token),
            transaction_type: "INVOICE".to_string(),
            amount: 42,
            content_hash: ContentHash::from_bytes([3u8; 32]),
            content_pointer: ContentPointer::new("bafkexample"),
            principal: principal.clone(),
        }
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let handle = LedgerService::start(Ledger::new(admin()).unwrap()).unwrap();
        let sme = Principal::new("0xsme");
        handle.authorize(&admin(), &sme, true).await.unwrap();

        let receipt = handle.append(request("T1", &sme)).await.unwrap();
        assert_eq!(receipt.sequence, 2);
        assert_eq!(handle.total_transactions(), 1);
        assert_eq!(
            handle.lookup_by_token(&TokenId::new("T1")).await.unwrap(),
            Some(receipt.record.clone())
        );
        assert_eq!(handle.get_trail(&sme).await.unwrap(), vec![receipt.record]);
    }

    #[tokio::test]
    async fn test_admin_commands_are_gated() {
        let handle = LedgerService::start(Ledger::new(admin()).unwrap()).unwrap();
        let sme = Principal::new("0xsme");
        let err = handle.pause(&sme).await.unwrap_err();
        assert_eq!(err.reason(), ReasonCode::NotAdministrator);
        assert!(!handle.is_paused());

        handle.pause(&admin()).await.unwrap();
        assert!(handle.is_paused());
        handle.unpause(&admin()).await.unwrap();
        assert!(!handle.is_paused());
    }

    #[tokio::test]
    async fn test_checksummed_administrator_from_config_can_pause() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let checksummed = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";
        std::fs::write(
            &path,
            format!("[ledger]\nadministrator = \"{checksummed}\"\n"),
        )
        .unwrap();
        let config = attest_core::config::AttestConfig::load_from_file(&path).unwrap();

        let handle = LedgerService::open(&config.ledger).unwrap();
        handle.pause(&Principal::new(checksummed)).await.unwrap();
        assert!(handle.is_paused());
        assert_eq!(handle.administrator(), Principal::new(checksummed));
    }

    #[tokio::test]
    async fn test_open_from_config_uses_journal() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            administrator: admin(),
            journal_path: Some(dir.path().join("journal.jsonl")),
            event_channel_capacity: 16,
        };
        let sme = Principal::new("0xsme");
        {
            let handle = LedgerService::open(&config).unwrap();
            handle.authorize(&admin(), &sme, true).await.unwrap();
            handle.append(request("T1", &sme)).await.unwrap();
        }

        let reopened = LedgerService::open(&config).unwrap();
        assert_eq!(reopened.transaction_count(&sme), 1);
        assert!(reopened.verify(&TokenId::new("T1"), &sme).is_some());
    }
}
