//! Fault-injecting content store

use async_trait::async_trait;
use attest_core::ContentPointer;
use attest_store::{ContentStore, MemoryContentStore, StoreError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    failing_puts: AtomicU32,
    fail_all: AtomicBool,
    hang_puts: AtomicBool,
    put_calls: AtomicU32,
    get_calls: AtomicU32,
}

/// Wraps a store and fails or stalls calls on demand; clones share faults
#[derive(Debug, Clone)]
pub struct FlakyContentStore<S = MemoryContentStore> {
    inner: S,
    faults: Arc<Faults>,
    uploads: Arc<Mutex<Vec<ContentPointer>>>,
}

impl Default for FlakyContentStore {
    fn default() -> Self {
        Self::new(MemoryContentStore::new())
    }
}

impl<S> FlakyContentStore<S> {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `count` uploads with `Unavailable`
    pub fn fail_next_puts(&self, count: u32) {
        self.faults.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Fail every call until switched off
    pub fn fail_all(&self, fail: bool) {
        self.faults.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Make uploads never complete
    pub fn hang_puts(&self, hang: bool) {
        self.faults.hang_puts.store(hang, Ordering::SeqCst);
    }

    /// Number of upload attempts seen, including failed ones
    pub fn put_calls(&self) -> u32 {
        self.faults.put_calls.load(Ordering::SeqCst)
    }

    /// Number of fetch attempts seen
    pub fn get_calls(&self) -> u32 {
        self.faults.get_calls.load(Ordering::SeqCst)
    }

    /// Pointers of successful uploads, in order
    pub fn uploads(&self) -> Vec<ContentPointer> {
        self.uploads.lock().clone()
    }

    fn take_failure(&self) -> bool {
        if self.faults.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.faults
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for FlakyContentStore<S> {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentPointer, StoreError> {
        self.faults.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.hang_puts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.take_failure() {
            return Err(StoreError::Unavailable("injected upload failure".to_string()));
        }
        let pointer = self.inner.put(bytes).await?;
        self.uploads.lock().push(pointer.clone());
        Ok(pointer)
    }

    async fn get(&self, pointer: &ContentPointer) -> Result<Vec<u8>, StoreError> {
        self.faults.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected fetch failure".to_string()));
        }
        self.inner.get(pointer).await
    }
}
