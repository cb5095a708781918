//! Submission input and commit receipt

use attest_core::{
    metadata_digest, AttestError, AttestResult, ContentHash, ContentPointer, Principal,
    ReasonCode, TokenId, TransactionType,
};
use attest_ledger::{AppendRequest, TransactionRecord};
use serde::{Deserialize, Serialize};

/// Currencies accepted on submissions
pub const SUPPORTED_CURRENCIES: [&str; 8] = ["USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY"];

/// Descriptive fields carried alongside the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionMetadata {
    /// ISO currency code of `amount`
    pub currency: String,
    /// Free-form description
    pub description: Option<String>,
    /// Original file name of the document
    pub file_name: Option<String>,
}

impl Default for SubmissionMetadata {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            description: None,
            file_name: None,
        }
    }
}

/// One document plus the transaction it evidences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Intended token id; also the idempotency key
    pub token_id: TokenId,
    /// Submitting principal
    pub principal: Principal,
    /// Classification
    pub transaction_type: TransactionType,
    /// Amount in the lowest denomination
    pub amount: u64,
    /// Raw document bytes
    pub document: Vec<u8>,
    /// Descriptive metadata
    pub metadata: SubmissionMetadata,
}

impl Submission {
    /// Submission with default metadata
    pub fn new(
        token_id: TokenId,
        principal: Principal,
        transaction_type: TransactionType,
        amount: u64,
        document: Vec<u8>,
    ) -> Self {
        Self {
            token_id,
            principal,
            transaction_type,
            amount,
            document,
            metadata: SubmissionMetadata::default(),
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: SubmissionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reject malformed input before any external call
    pub fn validate(&self) -> AttestResult<()> {
        self.principal.validate()?;
        self.token_id.validate()?;
        if self.amount == 0 {
            return Err(AttestError::validation(
                ReasonCode::InvalidAmount,
                "amount",
                "amount must be greater than zero",
            ));
        }
        let currency = self.metadata.currency.trim().to_ascii_uppercase();
        if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
            return Err(AttestError::validation(
                ReasonCode::UnsupportedCurrency,
                "currency",
                format!(
                    "'{}' is not one of {}",
                    self.metadata.currency,
                    SUPPORTED_CURRENCIES.join(", ")
                ),
            ));
        }
        if self.document.is_empty() {
            return Err(AttestError::validation(
                ReasonCode::EmptyDocument,
                "document",
                "document has no bytes",
            ));
        }
        Ok(())
    }

    /// The ledger append binding this submission to an uploaded document
    pub fn append_request(
        &self,
        content_hash: ContentHash,
        content_pointer: ContentPointer,
    ) -> AppendRequest {
        AppendRequest {
            token_id: self.token_id.clone(),
            transaction_type: self.transaction_type.as_str().to_string(),
            amount: self.amount,
            content_hash,
            content_pointer,
            principal: self.principal.clone(),
        }
    }

    /// Fingerprint of the submission's descriptive fields
    pub fn fingerprint(&self, content_hash: &ContentHash) -> AttestResult<ContentHash> {
        metadata_digest(&Fingerprint {
            token_id: &self.token_id,
            principal: &self.principal,
            transaction_type: self.transaction_type.as_str(),
            amount: self.amount,
            currency: self.metadata.currency.trim().to_ascii_uppercase(),
            description: self.metadata.description.as_deref().unwrap_or_default(),
            file_name: self.metadata.file_name.as_deref(),
            file_size: self.document.len(),
            content_hash,
        })
    }
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    token_id: &'a TokenId,
    principal: &'a Principal,
    transaction_type: &'a str,
    amount: u64,
    currency: String,
    description: &'a str,
    file_name: Option<&'a str>,
    file_size: usize,
    content_hash: &'a ContentHash,
}

/// Proof that a submission reached `Committed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Token id
    pub token_id: TokenId,
    /// Submitter
    pub principal: Principal,
    /// Ledger timestamp
    pub timestamp: u64,
    /// Classification
    pub transaction_type: String,
    /// Amount
    pub amount: u64,
    /// Canonical document hash bound in the ledger
    pub content_hash: ContentHash,
    /// Where the document lives
    pub content_pointer: ContentPointer,
    /// Ledger event sequence; absent when the record was committed by an earlier attempt
    pub ledger_sequence: Option<u64>,
    /// Fingerprint of the submission's metadata
    pub metadata_digest: ContentHash,
    /// True when this run converged onto a record an earlier attempt committed
    pub replayed: bool,
}

impl CommitReceipt {
    pub(crate) fn from_record(
        record: TransactionRecord,
        ledger_sequence: Option<u64>,
        metadata_digest: ContentHash,
    ) -> Self {
        Self {
            replayed: ledger_sequence.is_none(),
            token_id: record.token_id,
            principal: record.principal,
            timestamp: record.timestamp,
            transaction_type: record.transaction_type,
            amount: record.amount,
            content_hash: record.content_hash,
            content_pointer: record.content_pointer,
            ledger_sequence,
            metadata_digest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission::new(
            TokenId::new("T1"),
            Principal::new("0xsme"),
            TransactionType::Invoice,
            1_250,
            b"invoice".to_vec(),
        )
    }

    #[test]
    fn test_validation() {
        assert!(submission().validate().is_ok());

        let mut s = submission();
        s.amount = 0;
        assert_eq!(s.validate().unwrap_err().reason(), ReasonCode::InvalidAmount);

        let mut s = submission();
        s.metadata.currency = "doge".into();
        assert_eq!(
            s.validate().unwrap_err().reason(),
            ReasonCode::UnsupportedCurrency
        );

        let mut s = submission();
        s.metadata.currency = "eur".into();
        assert!(s.validate().is_ok());

        let mut s = submission();
        s.document.clear();
        assert_eq!(s.validate().unwrap_err().reason(), ReasonCode::EmptyDocument);

        let mut s = submission();
        s.token_id = TokenId::new("z".repeat(65));
        assert_eq!(s.validate().unwrap_err().reason(), ReasonCode::InvalidTokenId);
    }

    #[test]
    fn test_fingerprint_tracks_metadata() {
        let hash = attest_core::content_hash(b"invoice");
        let a = submission().fingerprint(&hash).unwrap();
        assert_eq!(a, submission().fingerprint(&hash).unwrap());

        let described = submission().with_metadata(SubmissionMetadata {
            description: Some("March rent".into()),
            ..SubmissionMetadata::default()
        });
        assert_ne!(a, described.fingerprint(&hash).unwrap());
    }

    #[test]
    fn test_append_request_uses_canonical_type() {
        let req = submission().append_request(
            ContentHash::from_bytes([1; 32]),
            ContentPointer::new("bafk1"),
        );
        assert_eq!(req.transaction_type, "INVOICE");
        assert_eq!(req.amount, 1_250);
    }
}
