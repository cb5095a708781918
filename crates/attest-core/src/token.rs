//! Token id scheme
//!
//! Generated ids look like `TXN_20240131_42_PAYMENT_101500_9F2C01AB`:
//! prefix, UTC date, submitter subject, transaction type, UTC time and eight
//! random upper-case hex characters. Clients may still bring their own ids;
//! the ledger only enforces the 1..=64 byte bound.

use crate::errors::{AttestError, ReasonCode, Result};
use crate::identifiers::{TokenId, TransactionType, MAX_TOKEN_ID_BYTES};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix every generated id starts with
pub const TOKEN_PREFIX: &str = "TXN";

const SUFFIX_LEN: usize = 8;

/// Generates token ids in the `TXN_…` format
#[derive(Debug, Clone, Default)]
pub struct TokenIdGenerator;

impl TokenIdGenerator {
    /// Generate an id for `subject` at time `at`
    ///
    /// The subject is reduced to ASCII alphanumerics and shortened so the
    /// result always fits the ledger's token bound.
    pub fn generate(
        &self,
        subject: &str,
        transaction_type: TransactionType,
        at: DateTime<Utc>,
    ) -> TokenId {
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_ascii_uppercase();
        let fixed = format!(
            "{TOKEN_PREFIX}_{}__{}_{}_{suffix}",
            at.format("%Y%m%d"),
            transaction_type.as_str(),
            at.format("%H%M%S"),
        );
        let budget = MAX_TOKEN_ID_BYTES.saturating_sub(fixed.len());
        let mut subject: String = subject
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(budget)
            .collect();
        if subject.is_empty() {
            subject.push('0');
        }

        TokenId::new(format!(
            "{TOKEN_PREFIX}_{}_{subject}_{}_{}_{suffix}",
            at.format("%Y%m%d"),
            transaction_type.as_str(),
            at.format("%H%M%S"),
        ))
    }
}

/// Fields recovered from a generated token id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Submitter subject segment
    pub subject: String,
    /// Transaction classification
    pub transaction_type: TransactionType,
    /// Generation time (second precision)
    pub issued_at: DateTime<Utc>,
    /// Random suffix
    pub suffix: String,
}

/// Validation and parsing for generated token ids
pub struct TokenFormat;

impl TokenFormat {
    /// Whether `token` follows the generated format
    pub fn verify(token: &str) -> bool {
        Self::parse(token).is_ok()
    }

    /// Split a generated token id into its metadata
    pub fn parse(token: &str) -> Result<TokenMetadata> {
        let invalid = |why: &str| {
            AttestError::validation(
                ReasonCode::InvalidTokenId,
                "token_id",
                format!("'{token}' is not a generated token id: {why}"),
            )
        };

        let parts: Vec<&str> = token.split('_').collect();
        let [prefix, date, subject, kind, time, suffix] = parts.as_slice() else {
            return Err(invalid("expected 6 segments"));
        };
        if *prefix != TOKEN_PREFIX {
            return Err(invalid("wrong prefix"));
        }
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("date must be YYYYMMDD"));
        }
        if subject.is_empty() {
            return Err(invalid("empty subject"));
        }
        let transaction_type: TransactionType = kind.parse()?;
        if time.len() != 6 || !time.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("time must be HHMMSS"));
        }
        if suffix.len() != SUFFIX_LEN {
            return Err(invalid("suffix must be 8 characters"));
        }

        let issued_at = NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S")
            .map_err(|e| invalid(&e.to_string()))?
            .and_utc();

        Ok(TokenMetadata {
            subject: (*subject).to_string(),
            transaction_type,
            issued_at,
            suffix: (*suffix).to_string(),
        })
    }
}
