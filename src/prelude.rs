//! Convenient imports for the cache.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```
//! use strata_cache::prelude::*;
//!
//! let cache = Cache::new();
//! cache.put("key", "value").unwrap();
//! ```

// Main entry point
pub use crate::cache::{Cache, CacheBuilder, Transaction};

// Error handling
pub use crate::error::{Error, Result};

// Core types
pub use strata_cache_core::{
    Delta, EntryVersion, IsolationLevel, Key, Metadata, Value, WriteSkewPolicy,
};
