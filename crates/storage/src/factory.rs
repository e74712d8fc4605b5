//! Entry factory
//!
//! The single place that decides which stored-entry variant a write gets.
//! Selection follows the bounds in the supplied [`Metadata`]:
//!
//! 1. no lifespan, no max idle: `Immortal`
//! 2. lifespan only: `Mortal`, created at the supplied time or now
//! 3. max idle only: `Transient`, last used at the supplied time or now
//! 4. both: `TransientMortal`

use crate::entry::{EntryKind, Payload, StoredEntry, StoredValue};
use std::sync::Arc;
use strata_cache_core::{Key, Metadata, PrivateMetadata, TimeService, Value};

/// Builds stored entries with timestamps taken from a [`TimeService`].
#[derive(Debug, Clone)]
pub struct EntryFactory {
    time: Arc<dyn TimeService>,
}

impl EntryFactory {
    /// Create a factory reading time from `time`
    pub fn new(time: Arc<dyn TimeService>) -> Self {
        Self { time }
    }

    /// The clock used for default timestamps
    pub fn time_service(&self) -> &Arc<dyn TimeService> {
        &self.time
    }

    /// Current wall-clock time in milliseconds
    #[inline]
    pub fn now(&self) -> i64 {
        self.time.wall_clock_time()
    }

    /// Create an entry timestamped now.
    pub fn create(&self, key: Key, value: Value, metadata: &Metadata) -> StoredEntry {
        self.create_value(value, metadata).to_entry(key)
    }

    /// Create an entry with explicit timestamps.
    ///
    /// `None` falls back to the current time. Timestamps the selected variant
    /// does not store are ignored.
    pub fn create_with_timestamps(
        &self,
        key: Key,
        value: Value,
        metadata: &Metadata,
        created: Option<i64>,
        last_used: Option<i64>,
    ) -> StoredEntry {
        self.create_value_with_timestamps(value, metadata, created, last_used)
            .to_entry(key)
    }

    /// Key-less counterpart of [`create`](Self::create).
    pub fn create_value(&self, value: Value, metadata: &Metadata) -> StoredValue {
        self.create_value_with_timestamps(value, metadata, None, None)
    }

    /// Key-less counterpart of [`create_with_timestamps`](Self::create_with_timestamps).
    pub fn create_value_with_timestamps(
        &self,
        value: Value,
        metadata: &Metadata,
        created: Option<i64>,
        last_used: Option<i64>,
    ) -> StoredValue {
        let payload = Payload::new(value, metadata.version().copied());
        self.build(payload, metadata, created, last_used)
    }

    fn build(
        &self,
        payload: Payload,
        metadata: &Metadata,
        created: Option<i64>,
        last_used: Option<i64>,
    ) -> StoredValue {
        let lifespan = metadata.lifespan();
        let max_idle = metadata.max_idle();
        match EntryKind::for_bounds(lifespan, max_idle) {
            EntryKind::Mortal => StoredValue::Mortal {
                payload,
                created: created.unwrap_or_else(|| self.now()),
                lifespan,
            },
            EntryKind::Transient => StoredValue::Transient {
                payload,
                last_used: last_used.unwrap_or_else(|| self.now()),
                max_idle,
            },
            EntryKind::TransientMortal => {
                let now = self.now();
                StoredValue::TransientMortal {
                    payload,
                    created: created.unwrap_or(now),
                    lifespan,
                    last_used: last_used.unwrap_or(now),
                    max_idle,
                }
            }
            EntryKind::Immortal | EntryKind::Tombstone => StoredValue::Immortal(payload),
        }
    }

    /// Replace the value and metadata of an existing entry.
    ///
    /// The variant is reselected for the new bounds and both timestamps restart
    /// at now. The private stamp of `existing` is carried over, including the
    /// stamp of a tombstone being overwritten.
    pub fn update(&self, existing: &StoredEntry, value: Value, metadata: &Metadata) -> StoredEntry {
        let internal = existing.internal_metadata().cloned();
        let payload = Payload::new(value, metadata.version().copied()).with_internal(internal);
        self.build(payload, metadata, None, None)
            .to_entry(existing.key().clone())
    }

    /// Create a tombstone for a removed key.
    pub fn create_tombstone(&self, key: Key, internal: PrivateMetadata) -> StoredEntry {
        StoredValue::Tombstone { internal }.to_entry(key)
    }
}
