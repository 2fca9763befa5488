//! Error types for kpivault
//!
//! One error enum for every component. The HTTP layer that sits on top of this
//! crate maps `KpiError::kind()` to status codes; it never parses messages.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::model::{BlobId, RecordId};

/// Result type alias using KpiError
pub type Result<T> = std::result::Result<T, KpiError>;

/// Unified error type for kpivault operations
#[derive(Debug, Error)]
pub enum KpiError {
    // -------------------------------------------------------------------------
    // Client-visible Errors
    // -------------------------------------------------------------------------
    #[error("{0} not found")]
    NotFound(Missing),

    #[error("Validation error: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Infrastructure Errors
    // -------------------------------------------------------------------------
    #[error("Store error: {0}")]
    Store(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[source] Box<KpiError>),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A rollback step failed after the forward step had already failed.
    /// The stores are inconsistent until an operator intervenes.
    #[error("Compensation failed: {rollback} (original error: {cause})")]
    CompensationFailure {
        #[source]
        cause: Box<KpiError>,
        rollback: Box<KpiError>,
    },

    // -------------------------------------------------------------------------
    // Local Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What a `NotFound` error failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// No active record with this id
    Record(RecordId),

    /// The record exists but does not reference this blob
    Attachment { record: RecordId, file: BlobId },

    /// No blob object with this id
    Blob(BlobId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Record(id) => write!(f, "record {}", id),
            Missing::Attachment { record, file } => {
                write!(f, "attachment {} in record {}", file, record)
            }
            Missing::Blob(id) => write!(f, "blob {}", id),
        }
    }
}

/// Coarse error classification for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Store,
    TransactionAborted,
    CompensationFailure,
    Timeout,
}

impl KpiError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            KpiError::NotFound(_) => ErrorKind::NotFound,
            KpiError::Validation(_) | KpiError::Config(_) => ErrorKind::Validation,
            KpiError::Store(_) | KpiError::Io(_) | KpiError::Serialization(_) => ErrorKind::Store,
            KpiError::TransactionAborted(_) => ErrorKind::TransactionAborted,
            KpiError::Timeout { .. } => ErrorKind::Timeout,
            KpiError::CompensationFailure { .. } => ErrorKind::CompensationFailure,
        }
    }

    /// Whether repeating the whole operation is safe and may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Store | ErrorKind::TransactionAborted | ErrorKind::Timeout
        )
    }

    pub(crate) fn record_not_found(id: RecordId) -> Self {
        KpiError::NotFound(Missing::Record(id))
    }

    pub(crate) fn compensation(cause: KpiError, rollback: KpiError) -> Self {
        KpiError::CompensationFailure {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }
}

impl From<serde_json::Error> for KpiError {
    fn from(e: serde_json::Error) -> Self {
        KpiError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for KpiError {
    fn from(e: bincode::Error) -> Self {
        KpiError::Serialization(e.to_string())
    }
}

/// Emit the failure event for an operation at a level matching its kind
pub(crate) fn log_failure(operation: &'static str, error: &KpiError) {
    match error.kind() {
        ErrorKind::NotFound | ErrorKind::Validation => {
            tracing::debug!(operation, kind = ?error.kind(), error = %error, "Operation rejected")
        }
        ErrorKind::CompensationFailure => {
            tracing::error!(operation, error = %error, "Operation left stores inconsistent")
        }
        _ => tracing::warn!(operation, kind = ?error.kind(), error = %error, "Operation failed"),
    }
}
