//! # Attest Store
//!
//! Boundary to the external content-addressed document store.
//!
//! - [`ContentStore`]: `put(bytes) -> pointer`, `get(pointer) -> bytes`
//! - [`MemoryContentStore`], [`FilesystemContentStore`]: local adapters
//! - [`ContentStoreClient`]: local hashing, call timeouts, verified fetch
//!
//! Stores address documents by `bafk` + hex(BLAKE3(bytes)). That scheme is
//! the store's business; the ledger binds the independent SHA-256 content
//! hash computed by the client.
//!
//! ## What's NOT in this crate
//!
//! - Replication and pinning
//! - Retries (`attest-pipeline` owns the policy)

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod filesystem;
pub mod memory;

pub use client::{ContentStoreClient, StoredContent};
pub use error::StoreError;
pub use filesystem::FilesystemContentStore;
pub use memory::MemoryContentStore;

use async_trait::async_trait;
use attest_core::ContentPointer;
use std::sync::Arc;

/// Prefix of every pointer produced by the local stores
pub const POINTER_PREFIX: &str = "bafk";

/// External content-addressed store
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their pointer
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentPointer, StoreError>;

    /// Fetch the bytes stored under `pointer`
    async fn get(&self, pointer: &ContentPointer) -> Result<Vec<u8>, StoreError>;
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentPointer, StoreError> {
        (**self).put(bytes).await
    }

    async fn get(&self, pointer: &ContentPointer) -> Result<Vec<u8>, StoreError> {
        (**self).get(pointer).await
    }
}

/// Pointer the local stores assign to `bytes`
pub fn pointer_for(bytes: &[u8]) -> ContentPointer {
    let digest = blake3::hash(bytes);
    ContentPointer::new(format!("{POINTER_PREFIX}{}", hex::encode(digest.as_bytes())))
}

/// Hex digest carried by a well-formed pointer
pub fn parse_pointer(pointer: &ContentPointer) -> Option<&str> {
    let digest = pointer.as_str().strip_prefix(POINTER_PREFIX)?;
    let well_formed = digest.len() == 64
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    well_formed.then_some(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_round_trip() {
        let pointer = pointer_for(b"doc");
        assert_eq!(pointer.as_str().len(), POINTER_PREFIX.len() + 64);
        assert_eq!(
            parse_pointer(&pointer),
            Some(&pointer.as_str()[POINTER_PREFIX.len()..])
        );
        assert_ne!(pointer_for(b"doc"), pointer_for(b"doc2"));
    }

    #[test]
    fn test_rejects_foreign_pointers() {
        assert!(parse_pointer(&ContentPointer::new("Qm123")).is_none());
        assert!(parse_pointer(&ContentPointer::new(format!("bafk{}", "G".repeat(64)))).is_none());
    }
}
