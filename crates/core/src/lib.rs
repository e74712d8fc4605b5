//! Core types for strata-cache
//!
//! This crate defines the vocabulary shared by the storage and concurrency
//! layers:
//! - Key, TxId: identifiers
//! - Value: cached values
//! - EntryVersion, VersionGenerator: version stamps and their source
//! - Metadata, PrivateMetadata: expiration bounds and internal stamps
//! - Delta, DeltaLog: mergeable partial updates
//! - TimeService: wall-clock abstraction
//! - CacheConfig: validated configuration
//! - Error: the error type for every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod delta;
pub mod error;
pub mod metadata;
pub mod time;
pub mod types;
pub mod value;
pub mod version;

pub use config::{CacheConfig, CacheConfigBuilder, IsolationLevel, WriteSkewPolicy};
pub use delta::{Delta, DeltaLog};
pub use error::{Error, Result};
pub use metadata::{Metadata, MetadataBuilder, PrivateMetadata, UNBOUNDED};
pub use time::{ControlledTimeService, SystemTimeService, TimeService};
pub use types::{Key, TxId};
pub use value::Value;
pub use version::{
    ClusteredVersionGenerator, EntryVersion, NumericVersionGenerator, VersionComparison,
    VersionGenerator,
};
