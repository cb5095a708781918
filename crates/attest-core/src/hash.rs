//! Canonical content hashing
//!
//! The ledger binds documents by a locally computed SHA-256 digest, never by
//! the content store's own address.
//!
//! ```ignore
//! use attest_core::hash::content_hash;
//!
//! let digest = content_hash(b"invoice #42");
//! assert!(!digest.is_zero());
//! ```

use crate::errors::Result;
use crate::identifiers::ContentHash;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Canonical content hash of a document: SHA-256 (FIPS 180-4)
pub fn content_hash(document: &[u8]) -> ContentHash {
    ContentHash::from_bytes(Sha256::digest(document).into())
}

/// Digest of structured metadata in canonical JSON form
///
/// Object keys are sorted and no whitespace is emitted, so two values that
/// compare equal as JSON always hash identically.
pub fn metadata_digest<T: Serialize>(value: &T) -> Result<ContentHash> {
    // serde_json::Value keeps object keys in a BTreeMap, which sorts them.
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(content_hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            content_hash(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_metadata_digest_ignores_key_order() {
        let a = json!({"amount": 100, "currency": "USD", "type": "PAYMENT"});
        let b = json!({"type": "PAYMENT", "currency": "USD", "amount": 100});
        assert_eq!(metadata_digest(&a).unwrap(), metadata_digest(&b).unwrap());

        let c = json!({"type": "PAYMENT", "currency": "EUR", "amount": 100});
        assert_ne!(metadata_digest(&a).unwrap(), metadata_digest(&c).unwrap());
    }

    #[test]
    fn test_single_byte_change_changes_hash() {
        let original = b"quarterly invoice".to_vec();
        let mut tampered = original.clone();
        tampered[0] ^= 0x01;
        assert_ne!(content_hash(&original), content_hash(&tampered));
    }
}
