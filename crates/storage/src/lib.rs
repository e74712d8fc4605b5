//! Storage layer for the cache
//!
//! This crate implements the container-resident side of the cache:
//! - Expiry evaluator: pure lifespan / max-idle deadline checks
//! - Stored-entry variants: `StoredValue` / `StoredEntry`, one variant per
//!   combination of expiration bounds plus the tombstone marker
//! - EntryFactory: the single authority for variant selection
//! - DataContainer: the shared store contract, with `ShardedContainer` as
//!   its segmented DashMap implementation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod entry;
pub mod expiry;
pub mod factory;

pub use container::{ComputeAction, ContainerStats, DataContainer, Segment, ShardedContainer};
pub use entry::{EntryKind, Payload, StoredEntry, StoredValue};
pub use factory::EntryFactory;
