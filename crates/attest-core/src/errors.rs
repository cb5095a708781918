//! Unified error system for attest
//!
//! One error type covers every rejection the ledger and its collaborators can
//! produce. Each variant maps to one class of the rejection taxonomy and carries
//! a stable [`ReasonCode`] plus the offending field, so callers can tell
//! "resubmitting is useless" apart from "resubmitting may succeed".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-readable rejection reason.
///
/// The serialized form (`SCREAMING_SNAKE_CASE`) is part of the external
/// contract and must not change once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// The ledger is paused; appends are refused until an administrator unpauses.
    SystemPaused,
    /// The submitting principal is unknown or deauthorized.
    PrincipalUnauthorized,
    /// An administrative operation was called by someone else.
    NotAdministrator,
    /// Empty or zero principal identifier.
    InvalidPrincipal,
    /// Token id outside the 1..=64 byte bound.
    InvalidTokenId,
    /// Token id already recorded somewhere in the ledger.
    DuplicateTokenId,
    /// Amount must be strictly positive.
    InvalidAmount,
    /// Content hash is all zeroes.
    ZeroContentHash,
    /// Content hash is not 32 hex-encoded bytes.
    MalformedContentHash,
    /// Transaction type is empty.
    EmptyTransactionType,
    /// Transaction type is not one of the known classifications.
    UnknownTransactionType,
    /// Content pointer is empty.
    EmptyContentPointer,
    /// Currency is not one of the supported codes.
    UnsupportedCurrency,
    /// Submitted document has no bytes.
    EmptyDocument,
    /// Batch operation received no entries.
    EmptyBatch,
    /// Batch operation received lists of different lengths.
    BatchLengthMismatch,
    /// The content store could not be reached.
    StoreUnavailable,
    /// The ledger could not be reached.
    LedgerUnavailable,
    /// The content store has no document for the pointer.
    ContentNotFound,
    /// Configuration failed validation.
    InvalidConfig,
    /// Unexpected internal failure.
    Internal,
}

impl ReasonCode {
    /// The wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemPaused => "SYSTEM_PAUSED",
            Self::PrincipalUnauthorized => "PRINCIPAL_UNAUTHORIZED",
            Self::NotAdministrator => "NOT_ADMINISTRATOR",
            Self::InvalidPrincipal => "INVALID_PRINCIPAL",
            Self::InvalidTokenId => "INVALID_TOKEN_ID",
            Self::DuplicateTokenId => "DUPLICATE_TOKEN_ID",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::ZeroContentHash => "ZERO_CONTENT_HASH",
            Self::MalformedContentHash => "MALFORMED_CONTENT_HASH",
            Self::EmptyTransactionType => "EMPTY_TRANSACTION_TYPE",
            Self::UnknownTransactionType => "UNKNOWN_TRANSACTION_TYPE",
            Self::EmptyContentPointer => "EMPTY_CONTENT_POINTER",
            Self::UnsupportedCurrency => "UNSUPPORTED_CURRENCY",
            Self::EmptyDocument => "EMPTY_DOCUMENT",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::BatchLengthMismatch => "BATCH_LENGTH_MISMATCH",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            Self::ContentNotFound => "CONTENT_NOT_FOUND",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External service a transient failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Content-addressed document store
    Store,
    /// Ledger sequencer or its journal
    Ledger,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => f.write_str("content store"),
            Self::Ledger => f.write_str("ledger"),
        }
    }
}

/// Unified error type for all attest operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AttestError {
    /// Malformed input; never retried
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Stable reason code
        code: ReasonCode,
        /// Offending field
        field: String,
        /// Human readable detail
        message: String,
    },

    /// Caller lacks permission
    #[error("Permission denied on {field}: {message}")]
    Authorization {
        /// Stable reason code
        code: ReasonCode,
        /// Offending field
        field: String,
        /// Human readable detail
        message: String,
    },

    /// Token id already recorded
    #[error("Token {token_id} is already recorded")]
    Conflict {
        /// The duplicated token id
        token_id: String,
    },

    /// Ledger is paused
    #[error("Ledger is paused")]
    Paused,

    /// Collaborator temporarily unreachable; may succeed on retry
    #[error("{service} unavailable: {message}")]
    Transient {
        /// Which collaborator failed
        service: Service,
        /// Human readable detail
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Human readable detail
        message: String,
    },
}

impl AttestError {
    /// Create a validation error
    pub fn validation(
        code: ReasonCode,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            code,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an authorization error
    pub fn unauthorized(
        code: ReasonCode,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Authorization {
            code,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate token error
    pub fn conflict(token_id: impl Into<String>) -> Self {
        Self::Conflict {
            token_id: token_id.into(),
        }
    }

    /// Create a transient error
    pub fn transient(service: Service, message: impl Into<String>) -> Self {
        Self::Transient {
            service,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::validation(ReasonCode::InvalidConfig, field, message)
    }

    /// Stable reason code for this error
    pub fn reason(&self) -> ReasonCode {
        match self {
            Self::Validation { code, .. } | Self::Authorization { code, .. } => *code,
            Self::Conflict { .. } => ReasonCode::DuplicateTokenId,
            Self::Paused => ReasonCode::SystemPaused,
            Self::Transient {
                service: Service::Store,
                ..
            } => ReasonCode::StoreUnavailable,
            Self::Transient {
                service: Service::Ledger,
                ..
            } => ReasonCode::LedgerUnavailable,
            Self::NotFound { .. } => ReasonCode::ContentNotFound,
            Self::Internal { .. } => ReasonCode::Internal,
        }
    }

    /// The offending field, when the error is tied to one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::Authorization { field, .. } => Some(field),
            Self::Conflict { .. } => Some("token_id"),
            _ => None,
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Standard Result type for attest operations
pub type Result<T> = std::result::Result<T, AttestError>;

impl From<std::io::Error> for AttestError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AttestError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization: {err}"))
    }
}
