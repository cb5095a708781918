//! Ledger state machine
//!
//! [`Ledger`] owns the authorization registry, the per-principal trails, the
//! global token index, the pause flag and the outbound event log. It is plain
//! synchronous state; serialization of writers is the job of
//! [`LedgerService`](crate::service::LedgerService).
//!
//! Every mutation follows the same sequence: validate, journal, apply, emit.
//! Validation and journaling may fail; applying may not. A rejected mutation
//! therefore never leaves a partial change behind.

use crate::event::{EventEnvelope, EventLog, LedgerEvent};
use crate::journal::{JournalEntry, LedgerJournal, MemoryJournal};
use crate::record::{AppendRequest, PrincipalStats, Receipt, TransactionRecord};
use attest_authorization::{AuthorizationChange, AuthorizationRegistry};
use attest_core::{
    AttestError, AttestResult, ContentHash, HighWaterMark, LedgerClock, Principal, ReasonCode,
    SystemClock, TokenId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Builder for [`Ledger`]
#[derive(Debug)]
pub struct LedgerBuilder {
    administrator: Principal,
    clock: Option<Arc<dyn LedgerClock>>,
    journal: Option<Box<dyn LedgerJournal>>,
    event_capacity: usize,
}

impl LedgerBuilder {
    /// Use a specific clock instead of the system clock
    pub fn clock(mut self, clock: Arc<dyn LedgerClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Persist mutations to `journal` and rebuild state from it on open
    pub fn journal(mut self, journal: impl LedgerJournal + 'static) -> Self {
        self.journal = Some(Box::new(journal));
        self
    }

    /// Capacity of the event broadcast channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the ledger, replaying any journaled mutations
    pub fn open(self) -> AttestResult<Ledger> {
        self.administrator.validate()?;

        let journal = self
            .journal
            .unwrap_or_else(|| Box::new(MemoryJournal::new()));
        let entries = journal.replay()?;

        let mut ledger = Ledger {
            registry: AuthorizationRegistry::new(self.administrator),
            trails: HashMap::new(),
            token_index: HashMap::new(),
            total: 0,
            paused: false,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            high_water: HighWaterMark::default(),
            journal,
            events: EventLog::new(self.event_capacity),
        };

        let replayed = entries.len();
        for entry in entries {
            ledger.replay_entry(entry)?;
        }
        if replayed > 0 {
            tracing::info!(
                entries = replayed,
                records = ledger.total,
                paused = ledger.paused,
                "ledger rebuilt from journal"
            );
        }
        Ok(ledger)
    }
}

/// The system of record
#[derive(Debug)]
pub struct Ledger {
    registry: AuthorizationRegistry,
    trails: HashMap<Principal, Vec<TransactionRecord>>,
    token_index: HashMap<TokenId, (Principal, usize)>,
    total: u64,
    paused: bool,
    clock: Arc<dyn LedgerClock>,
    high_water: HighWaterMark,
    journal: Box<dyn LedgerJournal>,
    events: EventLog,
}

impl Ledger {
    /// Start building a ledger administered by `administrator`
    pub fn builder(administrator: Principal) -> LedgerBuilder {
        LedgerBuilder {
            administrator,
            clock: None,
            journal: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// In-memory ledger with the system clock
    pub fn new(administrator: Principal) -> AttestResult<Self> {
        Self::builder(administrator).open()
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Append a record; the only way records come into existence
    pub fn append(&mut self, request: AppendRequest) -> AttestResult<Receipt> {
        self.check_append(&request)?;

        let timestamp = self.high_water.peek(self.clock.now_millis());
        let record = TransactionRecord {
            token_id: request.token_id,
            principal: request.principal,
            timestamp,
            transaction_type: request.transaction_type.trim().to_string(),
            amount: request.amount,
            content_hash: request.content_hash,
            content_pointer: request.content_pointer,
            verified: true,
        };

        self.journal.append(&JournalEntry::Appended {
            record: record.clone(),
        })?;
        let sequence = self.apply_record(record.clone());

        tracing::info!(
            token_id = %record.token_id,
            principal = %record.principal,
            timestamp,
            sequence,
            "transaction logged"
        );
        Ok(Receipt { sequence, record })
    }

    /// Validate an append without changing anything
    ///
    /// Preconditions are checked in a fixed order and the first failing one
    /// determines the reason code.
    pub fn check_append(&self, request: &AppendRequest) -> AttestResult<()> {
        if self.paused {
            return Err(AttestError::Paused);
        }
        if !self.registry.is_authorized(&request.principal) {
            return Err(AttestError::unauthorized(
                ReasonCode::PrincipalUnauthorized,
                "principal",
                format!("{} is not authorized to append", request.principal),
            ));
        }
        request.token_id.validate()?;
        if self.token_index.contains_key(&request.token_id) {
            return Err(AttestError::conflict(request.token_id.as_str()));
        }
        if request.amount == 0 {
            return Err(AttestError::validation(
                ReasonCode::InvalidAmount,
                "amount",
                "amount must be greater than zero",
            ));
        }
        if request.content_hash.is_zero() {
            return Err(AttestError::validation(
                ReasonCode::ZeroContentHash,
                "content_hash",
                "content hash must not be zero",
            ));
        }
        if request.transaction_type.trim().is_empty() {
            return Err(AttestError::validation(
                ReasonCode::EmptyTransactionType,
                "transaction_type",
                "transaction type must not be empty",
            ));
        }
        if request.content_pointer.is_empty() {
            return Err(AttestError::validation(
                ReasonCode::EmptyContentPointer,
                "content_pointer",
                "content pointer must not be empty",
            ));
        }
        Ok(())
    }

    /// Set one principal's authorization flag
    pub fn authorize(
        &mut self,
        caller: &Principal,
        principal: &Principal,
        authorized: bool,
    ) -> AttestResult<AuthorizationChange> {
        let change = self
            .registry
            .prepare_authorize(caller, principal, authorized)?;
        self.commit_authorizations(vec![change.clone()])?;
        Ok(change)
    }

    /// Set several flags atomically
    pub fn batch_authorize(
        &mut self,
        caller: &Principal,
        principals: &[Principal],
        statuses: &[bool],
    ) -> AttestResult<Vec<AuthorizationChange>> {
        let changes = self.registry.prepare_batch(caller, principals, statuses)?;
        self.commit_authorizations(changes.clone())?;
        Ok(changes)
    }

    /// Suspend appends; a no-op when already paused
    pub fn pause(&mut self, caller: &Principal) -> AttestResult<()> {
        self.set_paused(caller, true)
    }

    /// Resume appends; a no-op when not paused
    pub fn unpause(&mut self, caller: &Principal) -> AttestResult<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&mut self, caller: &Principal, paused: bool) -> AttestResult<()> {
        self.registry.require_administrator(caller)?;
        if self.paused == paused {
            return Ok(());
        }
        self.journal.append(&JournalEntry::PauseChanged {
            paused,
            by: caller.clone(),
        })?;
        self.apply_pause(paused, caller.clone());
        tracing::info!(paused, by = %caller, "ledger pause flag changed");
        Ok(())
    }

    fn commit_authorizations(&mut self, changes: Vec<AuthorizationChange>) -> AttestResult<()> {
        self.journal.append(&JournalEntry::Authorized {
            changes: changes.clone(),
        })?;
        self.apply_authorizations(&changes);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Infallible apply steps, shared by live mutations and journal replay
    // ---------------------------------------------------------------------

    fn apply_record(&mut self, record: TransactionRecord) -> u64 {
        self.high_water.advance_to(record.timestamp);
        let trail = self.trails.entry(record.principal.clone()).or_default();
        self.token_index.insert(
            record.token_id.clone(),
            (record.principal.clone(), trail.len()),
        );
        self.total += 1;
        let event = LedgerEvent::TransactionLogged {
            token_id: record.token_id.clone(),
            principal: record.principal.clone(),
            timestamp: record.timestamp,
            content_hash: record.content_hash,
            transaction_type: record.transaction_type.clone(),
            amount: record.amount,
        };
        trail.push(record);
        self.events.emit(event)
    }

    fn apply_authorizations(&mut self, changes: &[AuthorizationChange]) {
        for change in changes {
            self.registry.apply(change);
            self.events.emit(LedgerEvent::AuthorizationChanged {
                principal: change.principal.clone(),
                authorized: change.authorized,
            });
        }
    }

    fn apply_pause(&mut self, paused: bool, by: Principal) {
        self.paused = paused;
        let event = if paused {
            LedgerEvent::Paused { by }
        } else {
            LedgerEvent::Unpaused { by }
        };
        self.events.emit(event);
    }

    fn replay_entry(&mut self, entry: JournalEntry) -> AttestResult<()> {
        match entry {
            JournalEntry::Appended { record } => {
                if self.token_index.contains_key(&record.token_id) {
                    return Err(AttestError::internal(format!(
                        "journal records token {} twice",
                        record.token_id
                    )));
                }
                self.apply_record(record);
            }
            JournalEntry::Authorized { changes } => self.apply_authorizations(&changes),
            JournalEntry::PauseChanged { paused, by } => self.apply_pause(paused, by),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Full append-ordered history of `principal`
    pub fn get_trail(&self, principal: &Principal) -> AttestResult<&[TransactionRecord]> {
        principal.validate()?;
        Ok(self
            .trails
            .get(principal)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// The record for `token_id` if it belongs to `principal`
    pub fn verify(&self, token_id: &TokenId, principal: &Principal) -> Option<&TransactionRecord> {
        self.lookup_by_token(token_id)
            .filter(|record| &record.principal == principal)
    }

    /// True iff the record exists for `principal` and its hash equals `expected`
    pub fn verify_integrity(
        &self,
        token_id: &TokenId,
        principal: &Principal,
        expected: &ContentHash,
    ) -> bool {
        self.verify(token_id, principal)
            .is_some_and(|record| record.content_hash.as_bytes() == expected.as_bytes())
    }

    /// The record for `token_id`, whoever owns it
    pub fn lookup_by_token(&self, token_id: &TokenId) -> Option<&TransactionRecord> {
        let (principal, position) = self.token_index.get(token_id)?;
        self.trails.get(principal)?.get(*position)
    }

    /// Number of records committed by `principal`
    pub fn transaction_count(&self, principal: &Principal) -> u64 {
        self.trails.get(principal).map_or(0, |trail| trail.len() as u64)
    }

    /// Number of records in the whole ledger
    pub fn total_transactions(&self) -> u64 {
        self.total
    }

    /// Authorization flag and record count for `principal`
    pub fn stats(&self, principal: &Principal) -> PrincipalStats {
        PrincipalStats {
            principal: principal.clone(),
            authorized: self.registry.is_authorized(principal),
            transaction_count: self.transaction_count(principal),
        }
    }

    /// Whether appends are suspended
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pure authorization lookup
    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.registry.is_authorized(principal)
    }

    /// The administrative identity
    pub fn administrator(&self) -> &Principal {
        self.registry.administrator()
    }

    /// Read-only access to the registry
    pub fn registry(&self) -> &AuthorizationRegistry {
        &self.registry
    }

    /// Events after `sequence`
    pub fn events_since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.events.since(sequence)
    }

    /// Sequence number of the latest event
    pub fn last_sequence(&self) -> u64 {
        self.events.last_sequence()
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::ContentPointer;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    struct StepClock(AtomicU64);

    impl StepClock {
        fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl LedgerClock for StepClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn admin() -> Principal {
        Principal::new("0xadmin")
    }

    fn sme() -> Principal {
        Principal::new("0xsme")
    }

    fn request(token: &str) -> AppendRequest {
        AppendRequest {
            token_id: TokenId::new(token),
            transaction_type: "PAYMENT".to_string(),
            amount: 100,
            content_hash: ContentHash::from_bytes([7u8; 32]),
            content_pointer: ContentPointer::new("ptr1"),
            principal: sme(),
        }
    }

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new(admin()).unwrap();
        ledger.authorize(&admin(), &sme(), true).unwrap();
        ledger
    }

    #[test]
    fn test_precondition_order() {
        let mut ledger = ledger();
        let stranger = Principal::new("0xstranger");

        // Paused wins over everything else.
        ledger.pause(&admin()).unwrap();
        let mut bad = request("");
        bad.principal = stranger.clone();
        bad.amount = 0;
        assert_eq!(ledger.append(bad.clone()).unwrap_err(), AttestError::Paused);
        ledger.unpause(&admin()).unwrap();

        // Then authorization.
        let err = ledger.append(bad.clone()).unwrap_err();
        assert_eq!(err.reason(), ReasonCode::PrincipalUnauthorized);
        assert_eq!(err.field(), Some("principal"));

        // Then token id, amount, hash, type, pointer.
        bad.principal = sme();
        assert_eq!(
            ledger.append(bad.clone()).unwrap_err().reason(),
            ReasonCode::InvalidTokenId
        );
        bad.token_id = TokenId::new("T9");
        assert_eq!(
            ledger.append(bad.clone()).unwrap_err().reason(),
            ReasonCode::InvalidAmount
        );
        bad.amount = 1;
        bad.content_hash = ContentHash::ZERO;
        assert_eq!(
            ledger.append(bad.clone()).unwrap_err().reason(),
            ReasonCode::ZeroContentHash
        );
        bad.content_hash = ContentHash::from_bytes([1u8; 32]);
        bad.transaction_type = "  ".to_string();
        assert_eq!(
            ledger.append(bad.clone()).unwrap_err().reason(),
            ReasonCode::EmptyTransactionType
        );
        bad.transaction_type = "INVOICE".to_string();
        bad.content_pointer = ContentPointer::new("");
        assert_eq!(
            ledger.append(bad.clone()).unwrap_err().reason(),
            ReasonCode::EmptyContentPointer
        );

        assert_eq!(ledger.total_transactions(), 0);
    }

    #[test]
    fn test_token_id_length_bounds() {
        let mut ledger = ledger();
        let max = "x".repeat(64);
        assert!(ledger.append(request(&max)).is_ok());
        let too_long = "y".repeat(65);
        assert_eq!(
            ledger.append(request(&too_long)).unwrap_err().reason(),
            ReasonCode::InvalidTokenId
        );
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let clock = Arc::new(StepClock::default());
        let mut ledger = Ledger::builder(admin())
            .clock(clock.clone())
            .open()
            .unwrap();
        ledger.authorize(&admin(), &sme(), true).unwrap();

        clock.set(5_000);
        ledger.append(request("T1")).unwrap();
        clock.set(1_000);
        ledger.append(request("T2")).unwrap();
        clock.set(9_000);
        ledger.append(request("T3")).unwrap();

        let stamps: Vec<u64> = ledger
            .get_trail(&sme())
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(stamps, vec![5_000, 5_000, 9_000]);
    }

    #[test]
    fn test_index_and_trail_agree() {
        let mut ledger = ledger();
        for i in 0..5 {
            ledger.append(request(&format!("T{i}"))).unwrap();
        }
        for record in ledger.get_trail(&sme()).unwrap() {
            assert_eq!(ledger.lookup_by_token(&record.token_id), Some(record));
            assert_eq!(ledger.verify(&record.token_id, &sme()), Some(record));
        }
        assert!(ledger
            .verify(&TokenId::new("T0"), &Principal::new("0xother"))
            .is_none());
    }

    #[test]
    fn test_transaction_type_is_trimmed() {
        let mut ledger = ledger();
        let mut req = request("T1");
        req.transaction_type = " PAYMENT ".to_string();
        let receipt = ledger.append(req.clone()).unwrap();
        assert_eq!(receipt.record.transaction_type, "PAYMENT");
        assert!(req.matches(&receipt.record));
    }

    #[test]
    fn test_pause_requires_administrator_and_is_idempotent() {
        let mut ledger = ledger();
        let err = ledger.pause(&sme()).unwrap_err();
        assert_eq!(err.reason(), ReasonCode::NotAdministrator);

        let before = ledger.last_sequence();
        ledger.pause(&admin()).unwrap();
        ledger.pause(&admin()).unwrap();
        assert_eq!(ledger.last_sequence(), before + 1);
        assert!(ledger.is_paused());
    }

    #[test]
    fn test_journal_failure_changes_nothing() {
        let journal = MemoryJournal::new();
        let mut ledger = Ledger::builder(admin())
            .journal(journal.clone())
            .open()
            .unwrap();
        ledger.authorize(&admin(), &sme(), true).unwrap();
        let sequence = ledger.last_sequence();

        journal.set_fail_writes(true);
        let err = ledger.append(request("T1")).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.reason(), ReasonCode::LedgerUnavailable);
        assert!(ledger.lookup_by_token(&TokenId::new("T1")).is_none());
        assert_eq!(ledger.total_transactions(), 0);
        assert_eq!(ledger.last_sequence(), sequence);

        journal.set_fail_writes(false);
        assert!(ledger.append(request("T1")).is_ok());
    }

    #[test]
    fn test_replay_rebuilds_state_and_events() {
        let journal = MemoryJournal::new();
        {
            let mut ledger = Ledger::builder(admin())
                .journal(journal.clone())
                .open()
                .unwrap();
            ledger.authorize(&admin(), &sme(), true).unwrap();
            ledger.append(request("T1")).unwrap();
            ledger.append(request("T2")).unwrap();
            ledger.pause(&admin()).unwrap();
        }

        let ledger = Ledger::builder(admin()).journal(journal).open().unwrap();
        assert_eq!(ledger.total_transactions(), 2);
        assert_eq!(ledger.transaction_count(&sme()), 2);
        assert!(ledger.is_paused());
        assert!(ledger.is_authorized(&sme()));
        assert_eq!(ledger.last_sequence(), 4);
        assert!(matches!(
            ledger.events_since(3)[0].event,
            LedgerEvent::Paused { .. }
        ));
    }

    #[test]
    fn test_invalid_administrator_is_rejected() {
        let err = Ledger::new(Principal::new("0x0")).unwrap_err();
        assert_eq!(err.reason(), ReasonCode::InvalidPrincipal);
    }
}
