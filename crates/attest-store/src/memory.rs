//! In-memory content store

use crate::error::StoreError;
use crate::{pointer_for, ContentStore};
use async_trait::async_trait;
use attest_core::ContentPointer;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Content store keeping documents in a shared map; clones share contents
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    data: Arc<RwLock<HashMap<ContentPointer, Vec<u8>>>>,
}

impl MemoryContentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a document exists under `pointer`
    pub fn contains(&self, pointer: &ContentPointer) -> bool {
        self.data.read().contains_key(pointer)
    }

    /// Overwrite a stored document, bypassing addressing (for tamper tests)
    pub fn corrupt(&self, pointer: &ContentPointer, bytes: Vec<u8>) {
        self.data.write().insert(pointer.clone(), bytes);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentPointer, StoreError> {
        let pointer = pointer_for(&bytes);
        self.data.write().entry(pointer.clone()).or_insert(bytes);
        Ok(pointer)
    }

    async fn get(&self, pointer: &ContentPointer) -> Result<Vec<u8>, StoreError> {
        self.data
            .read()
            .get(pointer)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(pointer.to_string()))
    }
}
