//! # Strata Cache
//!
//! Entry representation and transactional isolation core for an in-memory
//! data grid.
//!
//! Entries live in a segmented container, one variant per combination of
//! expiration bounds. Transactions work on private copies of the keys they
//! touch and push them into the container at commit, after a write-skew
//! check against the versions of record.
//!
//! ## Quick Start
//!
//! ```
//! use strata_cache::prelude::*;
//!
//! let cache = Cache::builder().versioning(true).build()?;
//!
//! // Auto-commit operations
//! cache.put("user:1", "Alice")?;
//! assert_eq!(cache.get("user:1")?, Some(Value::from("Alice")));
//!
//! // Expiring entries
//! cache.put_with_metadata("session", "token", Metadata::builder().lifespan(30_000).build())?;
//!
//! // Transactions
//! let mut tx = cache.begin();
//! tx.append_delta("visits", Delta::Add(1))?;
//! tx.remove("user:1")?;
//! tx.commit()?;
//! # Ok::<(), strata_cache::Error>(())
//! ```
//!
//! ## Layers
//!
//! - [`strata_cache_core`] - keys, values, versions, metadata, config, errors
//! - [`strata_cache_storage`] - stored-entry variants, entry factory, container
//! - [`strata_cache_concurrency`] - context entries, validation, transaction manager

#![warn(missing_docs)]

mod cache;
mod error;

pub mod prelude;

// Re-export main entry points
pub use cache::{Cache, CacheBuilder, CacheMetrics, Transaction};
pub use error::{Error, Result};

// Re-export the layers
pub use strata_cache_concurrency;
pub use strata_cache_core;
pub use strata_cache_storage;

// Re-export types
pub use strata_cache_core::{
    CacheConfig, Delta, EntryVersion, IsolationLevel, Key, Metadata, TimeService, Value,
    WriteSkewPolicy,
};
