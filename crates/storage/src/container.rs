//! Segmented data container
//!
//! The shared key/value store that every transaction commits into.
//!
//! # Design
//!
//! - DashMap keyed by segment id: keys in different segments never contend
//! - FxHashMap within a segment: O(1) lookups, fast non-crypto hash
//! - `compute` runs under the segment's write guard, which is the per-key
//!   serialization point shared by write-skew checks and commits
//!
//! # Expiration
//!
//! `get` treats an expired entry as a miss and drops it; `peek` returns
//! whatever is stored. Neither ever reports expiration as an error.

use crate::entry::StoredEntry;
use crate::factory::EntryFactory;
use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_cache_core::{CacheConfig, Key, Metadata, Result, TimeService, Value};
use tracing::{debug, trace};

/// Closure run by [`DataContainer::compute`].
///
/// Receives the key, the stored entry (expired entries included) and the
/// container's factory. `Ok(Some(e))` stores `e`, `Ok(None)` removes the key,
/// `Err` leaves the entry untouched. The closure must not call back into the
/// container.
pub type ComputeAction<'a> =
    Box<dyn FnOnce(&Key, Option<&StoredEntry>, &EntryFactory) -> Result<Option<StoredEntry>> + 'a>;

/// Eviction and expiration counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Entries removed through `evict`
    pub evictions: u64,
    /// Entries dropped because they expired
    pub expirations: u64,
}

/// Shared concurrent key/value store.
///
/// Context-entry commits mutate it only through [`compute`](Self::compute).
pub trait DataContainer: Send + Sync {
    /// Look up a live entry, recording the access.
    ///
    /// An expired entry is removed and reported as absent.
    fn get(&self, key: &Key) -> Option<StoredEntry>;

    /// Look up an entry without touching it or filtering expiration.
    fn peek(&self, key: &Key) -> Option<StoredEntry>;

    /// Store `value` under `key`.
    fn put(&self, key: Key, value: Value, metadata: Metadata);

    /// Remove a key, returning what was stored.
    fn remove(&self, key: &Key) -> Option<StoredEntry>;

    /// Drop a key from memory.
    fn evict(&self, key: &Key);

    /// Remove every entry.
    fn clear(&self);

    /// Atomically replace the entry for `key` with the result of `action`.
    fn compute(&self, key: &Key, action: ComputeAction<'_>) -> Result<Option<StoredEntry>>;

    /// True if a live, unexpired entry exists for `key`.
    fn contains_key(&self, key: &Key) -> bool;

    /// Number of live, unexpired entries.
    fn size(&self) -> usize;

    /// Number of stored entries, expired ones and tombstones included.
    fn size_including_expired(&self) -> usize;

    /// Drop `key` if its entry has expired, counting the expiration.
    ///
    /// Returns true if an entry was dropped.
    fn remove_expired(&self, key: &Key) -> bool;

    /// Drop every expired entry, returning how many were dropped.
    fn purge_expired(&self) -> usize;

    /// Drop every tombstone, returning how many were dropped.
    ///
    /// A transaction that read a key as absent before it was written and
    /// removed again is no longer detected as a write skew.
    fn purge_tombstones(&self) -> usize;

    /// Segment owning `key`.
    fn segment_for_key(&self, key: &Key) -> u32;

    /// Factory used to build stored entries.
    fn entry_factory(&self) -> &EntryFactory;

    /// Current counters.
    fn stats(&self) -> ContainerStats;
}

/// One keyspace segment.
#[derive(Debug, Default)]
pub struct Segment {
    pub(crate) data: FxHashMap<Key, StoredEntry>,
}

impl Segment {
    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the segment is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// [`DataContainer`] partitioned into a fixed number of segments.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use strata_cache_core::{Key, Metadata, SystemTimeService, Value};
/// use strata_cache_storage::{DataContainer, ShardedContainer};
///
/// let container = ShardedContainer::new(16, Arc::new(SystemTimeService));
/// container.put(Key::from("k"), Value::Int(1), Metadata::immortal());
/// assert_eq!(container.get(&Key::from("k")).unwrap().value(), Some(&Value::Int(1)));
/// ```
pub struct ShardedContainer {
    segments: DashMap<u32, Segment>,
    num_segments: u32,
    factory: EntryFactory,
    stats: StatsCounters,
}

impl ShardedContainer {
    /// Create a container with `num_segments` segments (at least one)
    pub fn new(num_segments: u32, time: Arc<dyn TimeService>) -> Self {
        let num_segments = num_segments.max(1);
        Self {
            segments: DashMap::with_capacity(num_segments as usize),
            num_segments,
            factory: EntryFactory::new(time),
            stats: StatsCounters::default(),
        }
    }

    /// Create a container sized by `config`
    pub fn from_config(config: &CacheConfig, time: Arc<dyn TimeService>) -> Self {
        Self::new(config.num_segments(), time)
    }

    /// Configured number of segments
    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }

    /// Number of entries stored in one segment
    pub fn segment_len(&self, segment: u32) -> usize {
        self.segments
            .get(&segment)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Snapshot of every stored entry, sorted by key
    pub fn entries(&self) -> Vec<StoredEntry> {
        let mut results: Vec<StoredEntry> = self
            .segments
            .iter()
            .flat_map(|segment| segment.data.values().cloned().collect::<Vec<_>>())
            .collect();
        results.sort_by(|a, b| a.key().cmp(b.key()));
        results
    }
}

impl ShardedContainer {
    fn drop_if_expired(&self, segment: &mut Segment, key: &Key, now: i64) -> bool {
        if !segment.data.get(key).is_some_and(|e| e.is_expired(now)) {
            return false;
        }
        segment.data.remove(key);
        self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, now, "expired entry dropped");
        true
    }
}

impl DataContainer for ShardedContainer {
    fn get(&self, key: &Key) -> Option<StoredEntry> {
        let mut segment = self.segments.get_mut(&self.segment_for_key(key))?;
        let now = self.factory.now();
        if self.drop_if_expired(&mut segment, key, now) {
            return None;
        }
        let entry = segment.data.get_mut(key)?;
        entry.refresh_last_used(now);
        Some(entry.clone())
    }

    fn peek(&self, key: &Key) -> Option<StoredEntry> {
        self.segments
            .get(&self.segment_for_key(key))
            .and_then(|segment| segment.data.get(key).cloned())
    }

    fn put(&self, key: Key, value: Value, metadata: Metadata) {
        let mut segment = self
            .segments
            .entry(self.segment_for_key(&key))
            .or_default();
        let entry = match segment.data.get(&key) {
            Some(existing) => self.factory.update(existing, value, &metadata),
            None => self.factory.create(key.clone(), value, &metadata),
        };
        trace!(key = %key, kind = ?entry.kind(), "put");
        segment.data.insert(key, entry);
    }

    fn remove(&self, key: &Key) -> Option<StoredEntry> {
        let removed = self
            .segments
            .get_mut(&self.segment_for_key(key))
            .and_then(|mut segment| segment.data.remove(key));
        if removed.is_some() {
            trace!(key = %key, "removed");
        }
        removed
    }

    fn evict(&self, key: &Key) {
        let evicted = self
            .segments
            .get_mut(&self.segment_for_key(key))
            .and_then(|mut segment| segment.data.remove(key));
        if evicted.is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "evicted");
        }
    }

    fn clear(&self) {
        let dropped = self.size_including_expired();
        self.segments.clear();
        debug!(entries = dropped, "container cleared");
    }

    fn compute(&self, key: &Key, action: ComputeAction<'_>) -> Result<Option<StoredEntry>> {
        let mut segment = self
            .segments
            .entry(self.segment_for_key(key))
            .or_default();
        let result = action(key, segment.data.get(key), &self.factory)?;
        match &result {
            Some(entry) => {
                trace!(key = %key, kind = ?entry.kind(), "compute stored");
                segment.data.insert(key.clone(), entry.clone());
            }
            None => {
                if segment.data.remove(key).is_some() {
                    trace!(key = %key, "compute removed");
                }
            }
        }
        Ok(result)
    }

    fn contains_key(&self, key: &Key) -> bool {
        let now = self.factory.now();
        self.peek(key)
            .map(|e| !e.is_tombstone() && !e.is_expired(now))
            .unwrap_or(false)
    }

    fn size(&self) -> usize {
        let now = self.factory.now();
        self.segments
            .iter()
            .map(|segment| {
                segment
                    .data
                    .values()
                    .filter(|e| !e.is_tombstone() && !e.is_expired(now))
                    .count()
            })
            .sum()
    }

    fn size_including_expired(&self) -> usize {
        self.segments.iter().map(|segment| segment.len()).sum()
    }

    fn purge_expired(&self) -> usize {
        let now = self.factory.now();
        let mut purged = 0;
        for mut segment in self.segments.iter_mut() {
            let before = segment.data.len();
            segment.data.retain(|_, e| !e.is_expired(now));
            purged += before - segment.data.len();
        }
        if purged > 0 {
            self.stats
                .expirations
                .fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged, now, "purged expired entries");
        }
        purged
    }

    fn remove_expired(&self, key: &Key) -> bool {
        let Some(mut segment) = self.segments.get_mut(&self.segment_for_key(key)) else {
            return false;
        };
        let now = self.factory.now();
        self.drop_if_expired(&mut segment, key, now)
    }

    fn purge_tombstones(&self) -> usize {
        let mut purged = 0;
        for mut segment in self.segments.iter_mut() {
            let before = segment.data.len();
            segment.data.retain(|_, e| !e.is_tombstone());
            purged += before - segment.data.len();
        }
        if purged > 0 {
            debug!(purged, "purged tombstones");
        }
        purged
    }

    fn segment_for_key(&self, key: &Key) -> u32 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.num_segments)) as u32
    }

    fn entry_factory(&self) -> &EntryFactory {
        &self.factory
    }

    fn stats(&self) -> ContainerStats {
        ContainerStats {
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ShardedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedContainer")
            .field("num_segments", &self.num_segments)
            .field("entries", &self.size_including_expired())
            .field("stats", &self.stats())
            .finish()
    }
}
