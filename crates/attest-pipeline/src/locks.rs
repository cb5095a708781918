//! Per-key mutual exclusion
//!
//! Submissions sharing a token id run one at a time; different token ids never
//! wait on each other. Entries are dropped once nobody holds or awaits them.

use attest_core::TokenId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<TokenId, Arc<AsyncMutex<()>>>>>;

/// Registry of per-key locks
#[derive(Debug, Clone, Default)]
pub struct KeyLocks {
    slots: Slots,
}

impl KeyLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &TokenId) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyGuard {
            key: key.clone(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Exclusive access to one key; released on drop
#[derive(Debug)]
pub struct KeyGuard {
    key: TokenId,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        // Release first so the slot's count only reflects other holders.
        self.guard.take();
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}
