//! Outbound ledger events
//!
//! Every committed mutation appends one or more events to an in-memory log
//! with a strictly increasing sequence number and publishes them on a
//! broadcast channel for downstream indexers. A lagging subscriber can catch
//! up from the log with [`EventLog::since`].

use attest_core::{ContentHash, Principal, TokenId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A committed ledger mutation as seen by downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A record was appended
    TransactionLogged {
        /// Token id
        token_id: TokenId,
        /// Submitter
        principal: Principal,
        /// Ledger timestamp
        timestamp: u64,
        /// Document digest
        content_hash: ContentHash,
        /// Classification label
        transaction_type: String,
        /// Amount in the lowest denomination
        amount: u64,
    },
    /// A principal's authorization flag was set
    AuthorizationChanged {
        /// Principal
        principal: Principal,
        /// New flag
        authorized: bool,
    },
    /// Appends were suspended
    Paused {
        /// Administrator that paused
        by: Principal,
    },
    /// Appends were resumed
    Unpaused {
        /// Administrator that unpaused
        by: Principal,
    },
}

/// Event with its position in the ledger's total order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// 1-based sequence number
    pub sequence: u64,
    /// The event
    pub event: LedgerEvent,
}

/// Append-only outbound event log
#[derive(Debug)]
pub struct EventLog {
    entries: Vec<EventEnvelope>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventLog {
    /// Create an empty log whose broadcast channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: Vec::new(),
            sender,
        }
    }

    /// Append and publish an event, returning its sequence number
    pub fn emit(&mut self, event: LedgerEvent) -> u64 {
        let sequence = self.entries.len() as u64 + 1;
        let envelope = EventEnvelope { sequence, event };
        // No subscribers is not an error; the log keeps the event.
        let _ = self.sender.send(envelope.clone());
        self.entries.push(envelope);
        sequence
    }

    /// Sequence number of the latest event, 0 when empty
    pub fn last_sequence(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Events with a sequence number greater than `sequence`
    pub fn since(&self, sequence: u64) -> Vec<EventEnvelope> {
        let start = usize::try_from(sequence).unwrap_or(usize::MAX);
        self.entries.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}
