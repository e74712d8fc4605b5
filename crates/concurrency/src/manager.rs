//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Write-skew validation against the versions of record
//! 2. Delta preparation (type checks before anything is applied)
//! 3. Version assignment for every changed key
//! 4. Application to the container, one `compute` per key
//!
//! ## Commit Sequence
//!
//! ```text
//! 0. no modifications           finish without locking
//! 1. lock the segments of every modified key, in segment order
//!    (a pending clear locks them all)
//! 2. mark_validating()          Active -> Validating
//! 3. validate_local()           IF conflicts: abort() and return WriteSkew
//! 4. prepare()                  IF delta mismatch: abort() and return WrongType
//! 5. assign_versions()          increment(current) or generate_new()
//! 6. ctx.commit(container)      Validating -> Committed
//! 7. release segment locks
//! ```
//!
//! Transactions whose keys fall in different segments commit in parallel.
//!
//! Remote version resolution suspends, so [`TransactionManager::commit_with_loader`]
//! resolves and remembers remote versions before taking the lock. The
//! locked local check then compares against those remembered versions.

use crate::context::InvocationContext;
use crate::entry::CacheEntry;
use crate::loader::EntryLoader;
use crate::sentinel::LookedUpEntry;
use crate::validation::{ValidationResult, WriteSkewValidator};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_cache_core::{CacheConfig, EntryVersion, Key, Result, TxId, VersionGenerator};
use strata_cache_storage::DataContainer;
use tracing::{debug, error, trace, warn};

/// Manages transaction lifecycle and atomic commits
///
/// # Thread Safety
///
/// A commit holds the lock of every segment it writes, so no other
/// transaction can change one of its versions of record between the
/// write-skew check and the writes.
pub struct TransactionManager {
    config: CacheConfig,
    generator: Arc<dyn VersionGenerator>,
    validator: WriteSkewValidator,

    /// One commit lock per container segment
    ///
    /// Without them two transactions could both validate against version v1
    /// and then both write, the second overwriting the first unchecked.
    segment_locks: Vec<Mutex<()>>,

    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionManager {
    /// Create a manager for caches configured by `config`
    ///
    /// # Arguments
    /// * `config` - Isolation, versioning and write-skew policy in force
    /// * `generator` - Source of new versions and of the non-existing version
    pub fn new(config: CacheConfig, generator: Arc<dyn VersionGenerator>) -> Self {
        let validator = WriteSkewValidator::from_config(&config, Arc::clone(&generator));
        let segment_locks = (0..config.num_segments().max(1))
            .map(|_| Mutex::new(()))
            .collect();
        Self {
            config,
            generator,
            validator,
            segment_locks,
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    /// Configuration in force
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Version generator in use
    pub fn generator(&self) -> &Arc<dyn VersionGenerator> {
        &self.generator
    }

    /// Write-skew validator in use
    pub fn validator(&self) -> &WriteSkewValidator {
        &self.validator
    }

    /// Start a transaction on this node
    pub fn begin(&self) -> InvocationContext {
        let ctx = InvocationContext::new(TxId::new(), &self.config);
        let ctx = if self.config.versioning() {
            ctx.with_non_existing_version(self.generator.non_existing_version())
        } else {
            ctx
        };
        trace!(tx = %ctx.tx_id(), isolation = ?ctx.isolation(), "transaction started");
        ctx
    }

    /// Context for a transaction that originated on another node
    pub fn begin_remote(&self, tx_id: TxId) -> InvocationContext {
        let ctx = InvocationContext::new(tx_id, &self.config).with_origin_local(false);
        if self.config.versioning() {
            ctx.with_non_existing_version(self.generator.non_existing_version())
        } else {
            ctx
        }
    }

    /// Number of transactions committed with at least one write
    pub fn committed_count(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Number of transactions aborted
    pub fn aborted_count(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn checked_entries(ctx: &InvocationContext) -> Vec<(Key, EntryVersion, bool)> {
        ctx.changed_entries()
            .filter_map(|(key, entry)| match entry {
                LookedUpEntry::Context(e) if !e.is_evicted() => e
                    .version_seen()
                    .map(|seen| (key.clone(), *seen, e.is_expired())),
                _ => None,
            })
            .collect()
    }

    /// Check every changed key against `container`.
    ///
    /// Passes trivially when write-skew checking is disabled for the cache.
    pub fn validate_local(
        &self,
        ctx: &InvocationContext,
        container: &dyn DataContainer,
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::ok();
        if !self.config.write_skew_check_enabled() {
            return Ok(result);
        }
        for (key, seen, expired) in Self::checked_entries(ctx) {
            result.merge(self.validator.check_local(
                &key,
                Some(&seen),
                expired,
                ctx.remembered_version(&key),
                container,
            )?);
        }
        Ok(result)
    }

    /// Check every changed key against its owner, fetching through `loader`.
    ///
    /// Resolved versions are remembered in `ctx`. Contexts that originated on
    /// another node are checked against the local container, which is the
    /// owner's copy.
    pub async fn validate_remote(
        &self,
        ctx: &mut InvocationContext,
        container: &dyn DataContainer,
        loader: &dyn EntryLoader,
    ) -> Result<ValidationResult> {
        if !ctx.is_origin_local() {
            return self.validate_local(ctx, container);
        }
        let mut result = ValidationResult::ok();
        if !self.config.write_skew_check_enabled() {
            return Ok(result);
        }
        for (key, seen, expired) in Self::checked_entries(ctx) {
            let segment = container.segment_for_key(&key);
            let current = self.validator.resolve_remote(ctx, &key, segment, loader).await?;
            result.merge(self.validator.judge(&key, &seen, &current, expired));
            ctx.remember_version(key, current);
        }
        Ok(result)
    }

    // ========================================================================
    // Commit
    // ========================================================================

    fn assign_versions(
        &self,
        ctx: &mut InvocationContext,
        container: &dyn DataContainer,
    ) -> Result<()> {
        for (key, entry) in ctx.changed_entries_mut() {
            if entry.is_evicted() {
                continue;
            }
            let next = match container.peek(key).and_then(|e| e.version().copied()) {
                Some(current) => self.generator.increment(&current)?,
                None => self.generator.generate_new()?,
            };
            let metadata = entry
                .metadata()
                .copied()
                .unwrap_or_default()
                .to_builder()
                .version(next)
                .build();
            entry.set_metadata(metadata);
            trace!(key = %key, version = %next, "assigned version");
        }
        Ok(())
    }

    /// Lock the segments `ctx` writes, in ascending segment order.
    fn lock_segments(
        &self,
        ctx: &InvocationContext,
        container: &dyn DataContainer,
    ) -> Vec<MutexGuard<'_, ()>> {
        let stripes = self.segment_locks.len();
        let mut segments: Vec<usize> = if ctx.is_clear_pending() {
            (0..stripes).collect()
        } else {
            ctx.changed_entries()
                .map(|(key, _)| container.segment_for_key(key) as usize % stripes)
                .collect()
        };
        segments.sort_unstable();
        segments.dedup();
        segments
            .into_iter()
            .map(|segment| self.segment_locks[segment].lock())
            .collect()
    }

    fn fail(&self, ctx: &mut InvocationContext, reason: String) {
        ctx.abort(reason);
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Commit a transaction atomically
    ///
    /// # Arguments
    /// * `ctx` - Transaction to commit (must be active)
    /// * `container` - Store to validate against and apply writes to
    ///
    /// # Returns
    /// - `Ok(())` on success, with `ctx` committed; a transaction without
    ///   writes takes no lock and is not counted
    /// - `Err(WriteSkew)` if a version of record moved; `ctx` is rolled back
    /// - any other error from preparation or application; `ctx` is rolled back
    pub fn commit(&self, ctx: &mut InvocationContext, container: &dyn DataContainer) -> Result<()> {
        if !ctx.has_modifications() {
            ctx.mark_validating()?;
            ctx.commit(container)?;
            trace!(tx = %ctx.tx_id(), "read-only transaction finished");
            return Ok(());
        }

        let _segment_guards = self.lock_segments(ctx, container);

        ctx.mark_validating()?;

        let validation = match self.validate_local(ctx, container) {
            Ok(v) => v,
            Err(e) => {
                error!(tx = %ctx.tx_id(), error = %e, "validation failed");
                self.fail(ctx, format!("validation failed: {}", e));
                return Err(e);
            }
        };
        if !validation.is_valid() {
            warn!(
                tx = %ctx.tx_id(),
                conflicts = validation.conflict_count(),
                "transaction aborted on write skew"
            );
            self.fail(ctx, "write skew".to_string());
            return validation.into_result();
        }

        if let Err(e) = ctx.prepare(container) {
            self.fail(ctx, format!("prepare failed: {}", e));
            return Err(e);
        }

        if self.config.versioning() {
            if let Err(e) = self.assign_versions(ctx, container) {
                error!(tx = %ctx.tx_id(), error = %e, "version assignment failed");
                self.fail(ctx, format!("version assignment failed: {}", e));
                return Err(e);
            }
        }

        if let Err(e) = ctx.commit(container) {
            self.fail(ctx, format!("commit failed: {}", e));
            return Err(e);
        }
        self.committed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Resolve remote versions through `loader`, then commit.
    ///
    /// A transient resolution failure is returned with `ctx` still active so
    /// the caller can retry or roll back. Conflicts and other errors roll
    /// `ctx` back.
    pub async fn commit_with_loader(
        &self,
        ctx: &mut InvocationContext,
        container: &dyn DataContainer,
        loader: &dyn EntryLoader,
    ) -> Result<()> {
        match self.validate_remote(ctx, container, loader).await {
            Ok(result) if result.is_valid() => {}
            Ok(result) => {
                warn!(tx = %ctx.tx_id(), "transaction aborted on remote write skew");
                self.fail(ctx, "write skew".to_string());
                return result.into_result();
            }
            Err(e) if e.is_transient() => {
                debug!(tx = %ctx.tx_id(), error = %e, "remote validation unavailable");
                return Err(e);
            }
            Err(e) => {
                self.fail(ctx, format!("remote validation failed: {}", e));
                return Err(e);
            }
        }
        self.commit(ctx, container)
    }

    /// Explicitly abort a transaction
    ///
    /// All buffered operations are discarded and the context is marked
    /// aborted.
    pub fn rollback(&self, ctx: &mut InvocationContext) {
        if ctx.is_active() {
            self.fail(ctx, "rolled back".to_string());
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("validator", &self.validator)
            .field("committed", &self.committed_count())
            .field("aborted", &self.aborted_count())
            .finish()
    }
}
