//! Core identifier types used across attest
//!
//! Identifiers are thin newtypes. They can hold any value so that boundary
//! operations can reject malformed input with a precise reason code; call
//! `validate()` before trusting one.

use crate::errors::{AttestError, ReasonCode, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum byte length of a token id
pub const MAX_TOKEN_ID_BYTES: usize = 64;

/// Identity under which transactions are submitted and authorized
///
/// Addresses are compared case-insensitively, so the value is lowercased on
/// construction and deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Create a principal from an address string
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().trim().to_ascii_lowercase())
    }

    /// Borrow the address
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty string and for all-zero addresses (`0x000…`, `0`)
    pub fn is_zero(&self) -> bool {
        let digits = self.0.strip_prefix("0x").unwrap_or(&self.0);
        digits.is_empty() || digits.bytes().all(|b| b == b'0')
    }

    /// Reject empty and zero principals
    pub fn validate(&self) -> Result<()> {
        if self.is_zero() {
            return Err(AttestError::validation(
                ReasonCode::InvalidPrincipal,
                "principal",
                format!("'{}' is not a valid principal", self.0),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Principal {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.0
    }
}

/// Client-chosen transaction identifier, doubling as the idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Create a token id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the 1..=64 byte bound
    pub fn validate(&self) -> Result<()> {
        let len = self.0.len();
        if len == 0 || len > MAX_TOKEN_ID_BYTES {
            return Err(AttestError::validation(
                ReasonCode::InvalidTokenId,
                "token_id",
                format!("length {len} outside 1..={MAX_TOKEN_ID_BYTES} bytes"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TokenId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 32-byte SHA-256 digest of a submitted document
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// The all-zero digest, never accepted by the ledger
    pub const ZERO: Self = Self([0u8; 32]);

    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Lowercase hex without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex characters, with or without a `0x` prefix
    pub fn from_hex(value: &str) -> Result<Self> {
        let digits = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(digits).map_err(|e| {
            AttestError::validation(ReasonCode::MalformedContentHash, "content_hash", e.to_string())
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            AttestError::validation(
                ReasonCode::MalformedContentHash,
                "content_hash",
                format!("expected 32 bytes, got {}", v.len()),
            )
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = AttestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Opaque reference returned by the content store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentPointer(String);

impl ContentPointer {
    /// Wrap a store reference
    pub fn new(pointer: impl Into<String>) -> Self {
        Self(pointer.into())
    }

    /// Borrow the reference
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pointer is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentPointer {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Business classification of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Outgoing or incoming payment
    Payment,
    /// Issued or received invoice
    Invoice,
    /// Operating expense
    Expense,
    /// Proof of purchase
    Receipt,
    /// Reversal of an earlier payment
    Refund,
    /// Signed agreement
    Contract,
    /// Anything else
    Other,
}

impl TransactionType {
    /// Every classification, in declaration order
    pub const ALL: [TransactionType; 7] = [
        Self::Payment,
        Self::Invoice,
        Self::Expense,
        Self::Receipt,
        Self::Refund,
        Self::Contract,
        Self::Other,
    ];

    /// Canonical upper-case label stored on the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::Invoice => "INVOICE",
            Self::Expense => "EXPENSE",
            Self::Receipt => "RECEIPT",
            Self::Refund => "REFUND",
            Self::Contract => "CONTRACT",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = AttestError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AttestError::validation(
                ReasonCode::EmptyTransactionType,
                "transaction_type",
                "transaction type is empty",
            ));
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                AttestError::validation(
                    ReasonCode::UnknownTransactionType,
                    "transaction_type",
                    format!("'{trimmed}' is not a known transaction type"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_normalization_and_zero() {
        let p = Principal::new(" 0xABCDEF ");
        assert_eq!(p.as_str(), "0xabcdef");
        assert!(p.validate().is_ok());

        assert!(Principal::new("").is_zero());
        assert!(Principal::new("0x0000000000000000000000000000000000000000").is_zero());
        let err = Principal::new("0x").validate().unwrap_err();
        assert_eq!(err.reason(), ReasonCode::InvalidPrincipal);
    }

    #[test]
    fn test_principal_deserializes_normalized() {
        let checksummed = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";
        let p: Principal = serde_json::from_str(&format!("\" {checksummed} \"")).unwrap();
        assert_eq!(p, Principal::new(checksummed));
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            format!("\"{}\"", checksummed.to_ascii_lowercase())
        );
    }

    #[test]
    fn test_token_id_bounds() {
        assert!(TokenId::new("T1").validate().is_ok());
        assert!(TokenId::new("x".repeat(64)).validate().is_ok());
        assert_eq!(
            TokenId::new("").validate().unwrap_err().reason(),
            ReasonCode::InvalidTokenId
        );
        assert_eq!(
            TokenId::new("x".repeat(65)).validate().unwrap_err().reason(),
            ReasonCode::InvalidTokenId
        );
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::from_bytes([0xab; 32]);
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::ZERO.is_zero());
        assert!(!hash.is_zero());
    }

    #[test]
    fn test_transaction_type_parse() {
        assert_eq!(
            "payment".parse::<TransactionType>().unwrap(),
            TransactionType::Payment
        );
        assert_eq!(
            "".parse::<TransactionType>().unwrap_err().reason(),
            ReasonCode::EmptyTransactionType
        );
        assert_eq!(
            "GIFT".parse::<TransactionType>().unwrap_err().reason(),
            ReasonCode::UnknownTransactionType
        );
    }
}
