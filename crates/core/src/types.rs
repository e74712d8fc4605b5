//! Core types for the cache
//!
//! This module defines the identifiers used throughout the system:
//! - [`Key`]: Opaque, byte-oriented cache key
//! - [`TxId`]: Unique identifier for a transaction / invocation

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transaction
///
/// Every invocation context carries one. It shows up in log records and in
/// conflict reports so a write-skew can be traced back to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(Uuid);

impl TxId {
    /// Create a new random TxId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache_core::types::TxId;
    ///
    /// let id1 = TxId::new();
    /// let id2 = TxId::new();
    /// assert_ne!(id1, id2);
    /// ```
    pub fn new() -> Self {
        TxId(Uuid::new_v4())
    }

    /// Create TxId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        TxId(Uuid::from_bytes(bytes))
    }

    /// Get raw bytes representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key
///
/// Keys are opaque byte strings. Equality, hashing and ordering are
/// structural over the bytes, so two keys built from the same string are
/// the same key.
///
/// # Examples
///
/// ```
/// use strata_cache_core::types::Key;
///
/// let k1 = Key::from("user:1");
/// let k2 = Key::new(b"user:1".to_vec());
/// assert_eq!(k1, k2);
/// assert_eq!(k1.to_string(), "user:1");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret the key as UTF-8, if it is
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => {
                for b in &self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}
