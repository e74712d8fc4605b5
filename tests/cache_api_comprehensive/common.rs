//! Shared test utilities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use strata_cache::prelude::*;
use strata_cache::strata_cache_core::{ControlledTimeService, Result as CoreResult};
use strata_cache::strata_cache_storage::{
    ComputeAction, ContainerStats, DataContainer, EntryFactory, ShardedContainer, StoredEntry,
};

/// Wall-clock start for every test cache
pub const T0: i64 = 1_000_000;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// A cache on a controlled clock.
pub struct TestCache {
    /// Cache under test
    pub cache: Cache,
    /// Clock driving expiration
    pub clock: Arc<ControlledTimeService>,
}

impl TestCache {
    /// Versioned repeatable-read cache with the strict write-skew rule
    pub fn new() -> Self {
        Self::with(|b| b)
    }

    /// Cache with builder overrides applied on top of the defaults
    pub fn with(configure: impl FnOnce(CacheBuilder) -> CacheBuilder) -> Self {
        init_tracing();
        let clock = Arc::new(ControlledTimeService::new(T0));
        let builder = Cache::builder()
            .versioning(true)
            .num_segments(16)
            .time_service(clock.clone());
        let cache = configure(builder).build().expect("valid test configuration");
        Self { cache, clock }
    }

    /// Read-committed cache
    pub fn read_committed() -> Self {
        Self::with(|b| b.isolation(IsolationLevel::ReadCommitted))
    }

    /// Move the clock forward
    pub fn advance(&self, millis: i64) {
        self.clock.advance(millis);
    }

    /// Version of record for `key`
    pub fn version_of(&self, key: &str) -> Option<EntryVersion> {
        self.cache.peek_entry(key).and_then(|e| e.version().copied())
    }
}

impl std::ops::Deref for TestCache {
    type Target = Cache;

    fn deref(&self) -> &Cache {
        &self.cache
    }
}

/// Container wrapper counting reads of the shared store.
pub struct SpyContainer {
    inner: ShardedContainer,
    reads: AtomicUsize,
}

impl SpyContainer {
    /// Empty spy on a controlled clock
    pub fn new() -> Self {
        Self {
            inner: ShardedContainer::new(4, Arc::new(ControlledTimeService::new(T0))),
            reads: AtomicUsize::new(0),
        }
    }

    /// Reads observed so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DataContainer for SpyContainer {
    fn get(&self, key: &Key) -> Option<StoredEntry> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }
    fn peek(&self, key: &Key) -> Option<StoredEntry> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.peek(key)
    }
    fn put(&self, key: Key, value: Value, metadata: Metadata) {
        self.inner.put(key, value, metadata)
    }
    fn remove(&self, key: &Key) -> Option<StoredEntry> {
        self.inner.remove(key)
    }
    fn evict(&self, key: &Key) {
        self.inner.evict(key)
    }
    fn clear(&self) {
        self.inner.clear()
    }
    fn compute(&self, key: &Key, action: ComputeAction<'_>) -> CoreResult<Option<StoredEntry>> {
        self.inner.compute(key, action)
    }
    fn contains_key(&self, key: &Key) -> bool {
        self.inner.contains_key(key)
    }
    fn size(&self) -> usize {
        self.inner.size()
    }
    fn size_including_expired(&self) -> usize {
        self.inner.size_including_expired()
    }
    fn remove_expired(&self, key: &Key) -> bool {
        self.inner.remove_expired(key)
    }
    fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }
    fn purge_tombstones(&self) -> usize {
        self.inner.purge_tombstones()
    }
    fn segment_for_key(&self, key: &Key) -> u32 {
        self.inner.segment_for_key(key)
    }
    fn entry_factory(&self) -> &EntryFactory {
        self.inner.entry_factory()
    }
    fn stats(&self) -> ContainerStats {
        self.inner.stats()
    }
}

/// Standard test values covering common types
pub fn standard_test_values() -> Vec<(&'static str, Value)> {
    vec![
        ("null", Value::Null),
        ("bool_true", Value::Bool(true)),
        ("int_pos", Value::Int(42)),
        ("int_neg", Value::Int(-42)),
        ("float", Value::Float(3.5)),
        ("string", Value::String("hello world".into())),
        ("string_empty", Value::String("".into())),
        ("bytes", Value::Bytes(vec![0x00, 0x01, 0xFF, 0xFE])),
        (
            "array",
            Value::Array(vec![Value::Int(1), Value::String("two".into())]),
        ),
        ("object", {
            let mut m = std::collections::HashMap::new();
            m.insert("nested".to_string(), Value::Int(123));
            Value::Object(m)
        }),
    ]
}
