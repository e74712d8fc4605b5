//! Concurrency layer for the cache
//!
//! This crate implements the transaction-local side of the cache:
//! - CacheEntry / ContextEntry: per-key working copies with read-committed or
//!   repeatable-read isolation and an optional version seen
//! - DeltaAwareEntry: working copy that folds queued deltas at commit
//! - NullEntry / ClearEntry / AsyncRemovalMarker: stateless sentinels
//! - InvocationContext: the per-transaction working set
//! - WriteSkewValidator: version-of-record checks, local and remote
//! - TransactionManager: serialized validate-then-apply commits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod async_marker;
pub mod context;
pub mod delta_entry;
pub mod entry;
pub mod flags;
pub mod loader;
pub mod manager;
pub mod sentinel;
pub mod validation;

pub use async_marker::{AsyncBatchTracker, AsyncRemovalMarker};
pub use context::{InvocationContext, TransactionStatus};
pub use delta_entry::DeltaAwareEntry;
pub use entry::{CacheEntry, ContextEntry};
pub use flags::EntryFlags;
pub use loader::{ContainerEntryLoader, EntryLoader, LoadHint};
pub use manager::TransactionManager;
pub use sentinel::{ClearEntry, LookedUpEntry, NullEntry};
pub use validation::{ConflictType, ValidationResult, WriteSkewValidator};
