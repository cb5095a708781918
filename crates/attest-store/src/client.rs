//! Content store client
//!
//! Hashes documents locally before upload so the canonical content hash never
//! depends on the store's own addressing, and bounds every store call with a
//! timeout that surfaces as [`StoreError::Unavailable`].

use crate::error::StoreError;
use crate::ContentStore;
use attest_core::{content_hash, ContentHash, ContentPointer, ReasonCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    /// Canonical SHA-256 of the document
    pub content_hash: ContentHash,
    /// Store reference
    pub content_pointer: ContentPointer,
    /// Document size in bytes
    pub size: usize,
}

/// Adapter in front of a [`ContentStore`]
#[derive(Debug, Clone)]
pub struct ContentStoreClient<S> {
    store: S,
    call_timeout: Duration,
}

impl<S: ContentStore> ContentStoreClient<S> {
    /// Wrap `store`, bounding each call by `call_timeout`
    pub fn new(store: S, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Hash locally, then upload
    pub async fn store(&self, document: &[u8]) -> Result<StoredContent, StoreError> {
        if document.is_empty() {
            return Err(StoreError::Invalid {
                code: ReasonCode::EmptyDocument,
                field: "document".to_string(),
                message: "document has no bytes".to_string(),
            });
        }

        let hash = content_hash(document);
        let pointer = self
            .bounded("put", self.store.put(document.to_vec()))
            .await?;
        tracing::debug!(content_hash = %hash, %pointer, size = document.len(), "document uploaded");

        Ok(StoredContent {
            content_hash: hash,
            content_pointer: pointer,
            size: document.len(),
        })
    }

    /// Retrieve raw bytes
    pub async fn fetch(&self, pointer: &ContentPointer) -> Result<Vec<u8>, StoreError> {
        self.bounded("get", self.store.get(pointer)).await
    }

    /// Retrieve and re-hash; true iff the bytes still hash to `expected`
    pub async fn fetch_verified(
        &self,
        pointer: &ContentPointer,
        expected: &ContentHash,
    ) -> Result<bool, StoreError> {
        let bytes = self.fetch(pointer).await?;
        let matches = content_hash(&bytes) == *expected;
        if !matches {
            tracing::warn!(%pointer, expected = %expected, "stored document does not match hash");
        }
        Ok(matches)
    }

    async fn bounded<T>(
        &self,
        op: &str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "{op} timed out after {:?}",
                self.call_timeout
            ))),
        }
    }
}
