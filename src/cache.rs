//! Main cache entry point.
//!
//! This module provides the `Cache` struct, the primary entry point for all
//! cache operations, and the [`Transaction`] handle returned by
//! [`Cache::begin`].

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use strata_cache_concurrency::{
    AsyncBatchTracker, AsyncRemovalMarker, EntryLoader, InvocationContext, TransactionManager,
    TransactionStatus,
};
use strata_cache_core::{
    CacheConfig, CacheConfigBuilder, ClusteredVersionGenerator, Delta, IsolationLevel, Key,
    Metadata, NumericVersionGenerator, SystemTimeService, TimeService, Value, VersionGenerator,
    WriteSkewPolicy,
};
use strata_cache_storage::{DataContainer, ShardedContainer, StoredEntry};
use tracing::{debug, info};

/// The cache.
///
/// Holds the shared container and the transaction manager. Every write goes
/// through a transaction; the non-transactional methods open and commit one
/// per call.
///
/// # Example
///
/// ```
/// use strata_cache::prelude::*;
///
/// let cache = Cache::builder().versioning(true).build().unwrap();
///
/// cache.put("counter", 1i64).unwrap();
///
/// let mut tx = cache.begin();
/// let current = tx.get("counter").unwrap().and_then(|v| v.as_int()).unwrap_or(0);
/// tx.put("counter", current + 1).unwrap();
/// tx.commit().unwrap();
///
/// assert_eq!(cache.get("counter").unwrap(), Some(Value::Int(2)));
/// ```
pub struct Cache {
    config: CacheConfig,
    container: Arc<ShardedContainer>,
    manager: TransactionManager,
    batches: AsyncBatchTracker,
}

impl Cache {
    /// Create a cache with default settings.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default(), Arc::new(SystemTimeService))
    }

    /// Create a builder for cache configuration.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    /// Create a cache from a validated configuration and a clock.
    pub fn with_config(config: CacheConfig, time: Arc<dyn TimeService>) -> Self {
        Self::assemble(config, time, Arc::new(NumericVersionGenerator::new()))
    }

    fn assemble(
        config: CacheConfig,
        time: Arc<dyn TimeService>,
        generator: Arc<dyn VersionGenerator>,
    ) -> Self {
        let container = Arc::new(ShardedContainer::from_config(&config, time));
        let manager = TransactionManager::new(config.clone(), generator);
        info!(
            isolation = ?config.isolation(),
            versioning = config.versioning(),
            segments = config.num_segments(),
            "cache started"
        );
        Self {
            config,
            container,
            manager,
            batches: AsyncBatchTracker::new(),
        }
    }

    /// Configuration in force
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Shared container
    pub fn container(&self) -> &Arc<ShardedContainer> {
        &self.container
    }

    /// Transaction manager
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// Tracker for async removal batches
    pub fn batches(&self) -> &AsyncBatchTracker {
        &self.batches
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a transaction.
    ///
    /// Dropping the returned handle without committing rolls it back.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            cache: self,
            ctx: self.manager.begin(),
        }
    }

    // =========================================================================
    // Auto-commit API
    // =========================================================================

    /// Get a value.
    ///
    /// Returns `None` if the key is absent or expired.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let mut tx = self.begin();
        let value = tx.get(key)?;
        tx.commit()?;
        Ok(value)
    }

    /// Set a value with the default metadata.
    pub fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let mut tx = self.begin();
        tx.put(key, value)?;
        tx.commit()
    }

    /// Set a value with explicit expiration bounds.
    pub fn put_with_metadata(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        metadata: Metadata,
    ) -> Result<()> {
        let mut tx = self.begin();
        tx.put_with_metadata(key, value, metadata)?;
        tx.commit()
    }

    /// Remove a key, returning the value it held.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let mut tx = self.begin();
        let previous = tx.remove(key)?;
        tx.commit()?;
        Ok(previous)
    }

    /// Apply a delta to a key.
    pub fn apply_delta(&self, key: impl Into<Key>, delta: Delta) -> Result<()> {
        let mut tx = self.begin();
        tx.append_delta(key, delta)?;
        tx.commit()
    }

    // =========================================================================
    // Container inspection
    // =========================================================================

    /// Stored entry for `key`, expired or not, without touching it.
    pub fn peek_entry(&self, key: impl Into<Key>) -> Option<StoredEntry> {
        self.container.peek(&key.into())
    }

    /// True if `key` holds a live entry
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.container.contains_key(&key.into())
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        self.container.size()
    }

    /// Drop every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.container.purge_expired()
    }

    /// Drop every removal tombstone, returning how many were dropped.
    pub fn purge_tombstones(&self) -> usize {
        self.container.purge_tombstones()
    }

    /// Get cache metrics.
    pub fn metrics(&self) -> CacheMetrics {
        let stats = self.container.stats();
        CacheMetrics {
            transactions_committed: self.manager.committed_count(),
            transactions_aborted: self.manager.aborted_count(),
            entries: self.container.size_including_expired(),
            evictions: stats.evictions,
            expirations: stats.expirations,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("container", &self.container)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Cache metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Committed transactions that wrote at least one key
    pub transactions_committed: u64,
    /// Total aborted transactions
    pub transactions_aborted: u64,
    /// Entries held, expired ones included
    pub entries: usize,
    /// Entries removed through eviction
    pub evictions: u64,
    /// Entries dropped because they expired
    pub expirations: u64,
}

/// Builder for cache configuration.
///
/// # Example
///
/// ```
/// use strata_cache::prelude::*;
///
/// let cache = Cache::builder()
///     .isolation(IsolationLevel::RepeatableRead)
///     .versioning(true)
///     .write_skew_policy(WriteSkewPolicy::Strict)
///     .num_segments(16)
///     .build()
///     .unwrap();
/// assert!(cache.config().write_skew_check_enabled());
/// ```
pub struct CacheBuilder {
    config: CacheConfigBuilder,
    time: Arc<dyn TimeService>,
    topology_id: Option<u32>,
}

impl CacheBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: CacheConfig::builder(),
            time: Arc::new(SystemTimeService),
            topology_id: None,
        }
    }

    /// Set the isolation level.
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.config = self.config.isolation(isolation);
        self
    }

    /// Enable or disable entry versioning.
    pub fn versioning(mut self, enabled: bool) -> Self {
        self.config = self.config.versioning(enabled);
        self
    }

    /// Choose the write-skew comparison rule.
    pub fn write_skew_policy(mut self, policy: WriteSkewPolicy) -> Self {
        self.config = self.config.write_skew_policy(policy);
        self
    }

    /// Set the number of keyspace segments.
    pub fn num_segments(mut self, num_segments: u32) -> Self {
        self.config = self.config.num_segments(num_segments);
        self
    }

    /// Bound remote version resolution.
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.remote_timeout(timeout);
        self
    }

    /// Metadata applied to writes that supply none.
    pub fn default_metadata(mut self, metadata: Metadata) -> Self {
        self.config = self.config.default_metadata(metadata);
        self
    }

    /// Use `time` as the clock for expiration.
    pub fn time_service(mut self, time: Arc<dyn TimeService>) -> Self {
        self.time = time;
        self
    }

    /// Stamp versions with a cluster topology id instead of a local counter.
    pub fn clustered(mut self, topology_id: u32) -> Self {
        self.topology_id = Some(topology_id);
        self
    }

    /// Validate the configuration and build the cache.
    pub fn build(self) -> Result<Cache> {
        let config = self.config.build().map_err(Error::from)?;
        let generator: Arc<dyn VersionGenerator> = match self.topology_id {
            Some(id) => Arc::new(ClusteredVersionGenerator::new(id)),
            None => Arc::new(NumericVersionGenerator::new()),
        };
        Ok(Cache::assemble(config, self.time, generator))
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An open transaction.
///
/// Reads and writes are buffered in the transaction's context until
/// [`commit`](Self::commit). Dropping the handle without committing discards
/// every buffered change.
pub struct Transaction<'a> {
    cache: &'a Cache,
    ctx: InvocationContext,
}

impl<'a> Transaction<'a> {
    fn container(&self) -> &'a dyn DataContainer {
        self.cache.container.as_ref()
    }

    /// Underlying invocation context
    pub fn context(&self) -> &InvocationContext {
        &self.ctx
    }

    /// Lifecycle status
    pub fn status(&self) -> &TransactionStatus {
        self.ctx.status()
    }

    /// Read a key.
    pub fn get(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        let container = self.container();
        Ok(self.ctx.get(&key.into(), container)?)
    }

    /// Buffer a write with the default metadata.
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let container = self.container();
        Ok(self.ctx.put(key.into(), value.into(), container)?)
    }

    /// Buffer a write with explicit metadata.
    pub fn put_with_metadata(
        &mut self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        metadata: Metadata,
    ) -> Result<()> {
        let container = self.container();
        Ok(self
            .ctx
            .put_with_metadata(key.into(), value.into(), metadata, container)?)
    }

    /// Buffer a removal, returning the value the transaction saw.
    pub fn remove(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        let container = self.container();
        Ok(self.ctx.remove(&key.into(), container)?)
    }

    /// Buffer an eviction.
    pub fn evict(&mut self, key: impl Into<Key>) -> Result<()> {
        let container = self.container();
        Ok(self.ctx.evict(&key.into(), container)?)
    }

    /// Queue a delta for a key.
    pub fn append_delta(&mut self, key: impl Into<Key>, delta: Delta) -> Result<()> {
        let container = self.container();
        Ok(self.ctx.append_delta(&key.into(), delta, container)?)
    }

    /// Buffer a clear of the whole cache.
    pub fn clear(&mut self) -> Result<()> {
        Ok(self.ctx.clear()?)
    }

    /// Hold a key as absent until its async removal batch has passed.
    pub fn remove_async(&mut self, key: impl Into<Key>) -> Result<u64> {
        let marker = AsyncRemovalMarker::issue(key.into(), &self.cache.batches);
        let batch = marker.batch();
        self.ctx.record_async_removal(marker)?;
        Ok(batch)
    }

    /// Release keys whose async removal has completed.
    pub fn release_completed_removals(&mut self) -> usize {
        self.ctx.release_completed_removals(&self.cache.batches)
    }

    /// Validate and apply every buffered change.
    pub fn commit(mut self) -> Result<()> {
        let container = self.container();
        self.cache
            .manager
            .commit(&mut self.ctx, container)
            .map_err(Error::from)
    }

    /// Resolve versions through `loader`, then validate and apply.
    ///
    /// On a transient failure the transaction is handed back so the caller
    /// can retry or roll back.
    pub async fn commit_with_loader(
        mut self,
        loader: &dyn EntryLoader,
    ) -> std::result::Result<(), (Error, Option<Transaction<'a>>)> {
        let container = self.container();
        let result = self
            .cache
            .manager
            .commit_with_loader(&mut self.ctx, container, loader)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => Err((Error::from(e), Some(self))),
            Err(e) => Err((Error::from(e), None)),
        }
    }

    /// Discard every buffered change.
    pub fn rollback(mut self) {
        self.cache.manager.rollback(&mut self.ctx);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.ctx.is_active() {
            debug!(tx = %self.ctx.tx_id(), "transaction dropped without commit");
            self.cache.manager.rollback(&mut self.ctx);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("tx", &self.ctx.tx_id())
            .field("status", self.ctx.status())
            .field("entries", &self.ctx.entry_count())
            .finish()
    }
}
