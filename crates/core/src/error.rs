//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// The first three variants are deterministic business failures the caller is
/// expected to handle (skip-and-log in bulk imports, surface directly in
/// interactive flows). `Persistence` wraps storage failures inside a
/// transactional write; by the time it is returned the transaction has been
/// rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Decrement demand exceeds the total available across all candidate
    /// lots. No record was modified.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// A referenced item or warehouse does not resolve.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Malformed command (missing field, negative quantity where disallowed).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Underlying storage failed during a transactional write.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn insufficient(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::RecordNotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}
