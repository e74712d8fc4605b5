//! Async removal guard
//!
//! Removals pushed to a backing store asynchronously are grouped into
//! batches with monotonically increasing ids. While a removal is in flight a
//! context holds an [`AsyncRemovalMarker`] for the key instead of a plain
//! [`NullEntry`](crate::NullEntry): the key reads as absent, and the marker
//! reports the removal complete once the tracker has observed a strictly
//! newer batch id.
//!
//! This is a counter comparison, not a lock. Nothing blocks on a marker.

use crate::entry::CacheEntry;
use crate::flags::EntryFlags;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_cache_core::{Key, Metadata, Result, Value};
use strata_cache_storage::DataContainer;
use tracing::trace;

/// Monotonic source and observer of async batch ids.
#[derive(Debug, Default)]
pub struct AsyncBatchTracker {
    issued: AtomicU64,
    observed: AtomicU64,
}

impl AsyncBatchTracker {
    /// Tracker with no batches issued
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new batch and return its id
    pub fn next_batch(&self) -> u64 {
        let id = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(batch = id, "opened async batch");
        id
    }

    /// Id of the newest batch opened
    pub fn last_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Record that `batch` has been seen; older observations are ignored
    pub fn observe(&self, batch: u64) {
        let previous = self.observed.fetch_max(batch, Ordering::SeqCst);
        if batch > previous {
            trace!(batch, previous, "observed async batch");
        }
    }

    /// Newest batch id observed
    pub fn last_observed(&self) -> u64 {
        self.observed.load(Ordering::SeqCst)
    }

    /// True once a batch newer than `batch` has been observed
    pub fn has_passed(&self, batch: u64) -> bool {
        self.last_observed() > batch
    }
}

/// Absent-key marker for a removal issued in an async batch.
///
/// Behaves like a null entry: it reads as absent and every mutator is a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsyncRemovalMarker {
    key: Key,
    batch: u64,
}

impl AsyncRemovalMarker {
    /// Marker for `key` removed in the batch currently open on `tracker`
    pub fn issue(key: Key, tracker: &AsyncBatchTracker) -> Self {
        Self {
            key,
            batch: tracker.next_batch(),
        }
    }

    /// Marker for `key` removed in `batch`
    pub fn new(key: Key, batch: u64) -> Self {
        Self { key, batch }
    }

    /// Batch the removal was issued in
    pub fn batch(&self) -> u64 {
        self.batch
    }

    /// True once `tracker` has observed a newer batch
    pub fn is_complete(&self, tracker: &AsyncBatchTracker) -> bool {
        tracker.has_passed(self.batch)
    }
}

impl CacheEntry for AsyncRemovalMarker {
    fn key(&self) -> Option<&Key> {
        Some(&self.key)
    }

    fn value(&self) -> Option<&Value> {
        None
    }

    fn metadata(&self) -> Option<&Metadata> {
        None
    }

    fn flags(&self) -> EntryFlags {
        EntryFlags::empty()
    }

    fn set_flag(&mut self, _flag: EntryFlags, _on: bool) {}

    fn set_value(&mut self, _value: Option<Value>) {}

    fn set_metadata(&mut self, _metadata: Metadata) {}

    fn commit(&mut self, _container: &dyn DataContainer) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) {}

    fn is_null(&self) -> bool {
        true
    }

    fn skip_lookup(&self) -> bool {
        true
    }
}
