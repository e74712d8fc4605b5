//! Error types for the cache core
//!
//! Every crate in the workspace reports failures through this one enum. The
//! variants keep three families apart:
//!
//! - programming errors (`UnsupportedOperation`, `IllegalState`): fatal, never retried
//! - business conflicts (`WriteSkew`): the transaction must roll back
//! - infrastructure failures (`RemoteResolution`): transient, not a conflict

use crate::types::Key;
use crate::version::EntryVersion;
use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// All cache core errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Mutator invoked on an immutable entry (tombstone)
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Name of the rejected operation
        operation: &'static str,
    },

    /// Invariant the store is supposed to guarantee was found broken
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Version observed at read time is no longer the version of record
    #[error("write skew detected on key {key}: seen {seen}, current {current}")]
    WriteSkew {
        /// Conflicting key
        key: Key,
        /// Version observed when the entry was read into the transaction
        seen: EntryVersion,
        /// Authoritative version at validation time
        current: EntryVersion,
    },

    /// The authoritative version could not be fetched (network, timeout)
    #[error("remote version resolution failed for key {key}: {reason}")]
    RemoteResolution {
        /// Key being resolved
        key: Key,
        /// Underlying failure
        reason: String,
    },

    /// A delta was merged onto a value of an incompatible type
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Expected type
        expected: &'static str,
        /// Actual type found
        actual: &'static str,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Context used after it was committed or rolled back
    #[error("transaction {0} is no longer active")]
    TransactionNotActive(String),
}

impl Error {
    /// Build the "entries cannot have null versions" invariant violation.
    pub fn missing_version(key: &Key) -> Self {
        Error::IllegalState(format!(
            "entries cannot have null versions (key {})",
            key
        ))
    }

    /// Check if this is a write-skew conflict.
    pub fn is_write_skew(&self) -> bool {
        matches!(self, Error::WriteSkew { .. })
    }

    /// Check if this is a conflict error.
    ///
    /// Conflicts are business-level outcomes: the transaction rolls back and
    /// the transaction manager decides whether to retry.
    pub fn is_conflict(&self) -> bool {
        self.is_write_skew()
    }

    /// Check if this error is transient infrastructure failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteResolution { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            Error::IllegalState(_) | Error::UnsupportedOperation { .. }
        )
    }
}
