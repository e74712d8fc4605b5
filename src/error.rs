//! Unified error types for the cache.
//!
//! This module provides a clean error type that wraps the layered errors of
//! the core, storage and concurrency crates and presents a consistent
//! interface to users.

use thiserror::Error;

/// All cache errors.
///
/// Conflicts and transient failures are kept apart so callers never mistake
/// an unreachable owner for a business-level conflict.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Write skew: the transaction read a version that is no longer current
    #[error("conflict: {0}")]
    Conflict(String),

    /// The version of record could not be resolved (network, timeout)
    #[error("transient failure: {0}")]
    Transient(String),

    /// Wrong type for a delta
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Expected type
        expected: String,
        /// Actual type found
        actual: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Transaction used after commit or rollback
    #[error("transaction not active: {0}")]
    TransactionNotActive(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Conflicts may succeed on retry with fresh reads; transient failures
    /// may succeed once the owner is reachable again.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict() || self.is_transient()
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is a transient infrastructure failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

// Convert from the layered core error
impl From<strata_cache_core::Error> for Error {
    fn from(e: strata_cache_core::Error) -> Self {
        use strata_cache_core::Error as CoreError;
        match e {
            CoreError::WriteSkew { .. } => Error::Conflict(e.to_string()),
            CoreError::RemoteResolution { .. } => Error::Transient(e.to_string()),
            CoreError::WrongType { expected, actual } => Error::WrongType {
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
            CoreError::Config(msg) => Error::Config(msg),
            CoreError::TransactionNotActive(msg) => Error::TransactionNotActive(msg),
            CoreError::IllegalState(_) | CoreError::UnsupportedOperation { .. } => {
                Error::Internal(e.to_string())
            }
        }
    }
}
