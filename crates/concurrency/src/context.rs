//! Invocation context
//!
//! Per-transaction state: one [`LookedUpEntry`] per touched key, the versions
//! observed by reads, and versions resolved from remote owners. A context is
//! confined to the thread running its transaction and needs no locking.
//!
//! ## Lifecycle
//!
//! ```text
//! Active --commit--> Committed
//!   |  \--(validation)--> Validating --> Committed | Aborted
//!   \----rollback-----> Aborted
//! ```
//!
//! Any operation on a context that is no longer active fails with
//! `TransactionNotActive`.

use crate::async_marker::{AsyncBatchTracker, AsyncRemovalMarker};
use crate::delta_entry::DeltaAwareEntry;
use crate::entry::{CacheEntry, ContextEntry};
use crate::sentinel::{ClearEntry, LookedUpEntry, NullEntry};
use rustc_hash::FxHashMap;
use strata_cache_core::{
    CacheConfig, Delta, EntryVersion, Error, IsolationLevel, Key, Metadata, Result, TxId, Value,
};
use strata_cache_storage::{DataContainer, StoredEntry};
use tracing::{debug, error, trace};

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// What a read found in the container.
enum StoreRead {
    Live(StoredEntry),
    Expired(StoredEntry),
    Absent,
}

/// Per-transaction working set.
#[derive(Debug)]
pub struct InvocationContext {
    tx_id: TxId,
    isolation: IsolationLevel,
    versioning: bool,
    origin_local: bool,
    default_metadata: Metadata,
    non_existing_version: Option<EntryVersion>,
    status: TransactionStatus,
    entries: FxHashMap<Key, LookedUpEntry>,
    versions_read: FxHashMap<Key, EntryVersion>,
    remote_versions: FxHashMap<Key, EntryVersion>,
    clear: Option<ClearEntry>,
}

impl InvocationContext {
    /// New locally originated context configured from `config`
    pub fn new(tx_id: TxId, config: &CacheConfig) -> Self {
        Self {
            tx_id,
            isolation: config.isolation(),
            versioning: config.versioning(),
            origin_local: true,
            default_metadata: config.default_metadata(),
            non_existing_version: None,
            status: TransactionStatus::Active,
            entries: FxHashMap::default(),
            versions_read: FxHashMap::default(),
            remote_versions: FxHashMap::default(),
            clear: None,
        }
    }

    /// Mark the context as originating on another node
    pub fn with_origin_local(mut self, origin_local: bool) -> Self {
        self.origin_local = origin_local;
        self
    }

    /// Version recorded for reads of absent keys when versioning is on
    pub fn with_non_existing_version(mut self, version: EntryVersion) -> Self {
        self.non_existing_version = Some(version);
        self
    }

    /// Transaction id
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Isolation level
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Whether versions are tracked
    pub fn versioning(&self) -> bool {
        self.versioning
    }

    /// True if the transaction started on this node
    pub fn is_origin_local(&self) -> bool {
        self.origin_local
    }

    /// Metadata applied to writes that supply none
    pub fn default_metadata(&self) -> Metadata {
        self.default_metadata
    }

    /// Current lifecycle status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// True while the context accepts operations
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Fail unless the context is active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive(format!(
                "{} ({:?})",
                self.tx_id, self.status
            )))
        }
    }

    pub(crate) fn mark_validating(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Entry held for `key`, if the transaction touched it
    pub fn lookup_entry(&self, key: &Key) -> Option<&LookedUpEntry> {
        self.entries.get(key)
    }

    /// Number of keys touched
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Keys with changes to commit
    pub fn modified_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_changed())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// True if commit would write anything
    pub fn has_modifications(&self) -> bool {
        self.clear.is_some() || self.entries.values().any(|e| e.is_changed())
    }

    /// True if a clear is pending
    pub fn is_clear_pending(&self) -> bool {
        self.clear.is_some()
    }

    /// Version observed when `key` was read
    pub fn version_seen(&self, key: &Key) -> Option<&EntryVersion> {
        self.entries
            .get(key)
            .and_then(|e| e.version_seen())
            .or_else(|| self.versions_read.get(key))
    }

    /// Cache a version of record resolved from a remote owner
    pub fn remember_version(&mut self, key: Key, version: EntryVersion) {
        self.remote_versions.insert(key, version);
    }

    /// Version of record previously resolved for `key`
    pub fn remembered_version(&self, key: &Key) -> Option<&EntryVersion> {
        self.remote_versions.get(key)
    }

    fn read_store(&self, key: &Key, container: &dyn DataContainer, touch: bool) -> StoreRead {
        if self.clear.is_some() {
            return StoreRead::Absent;
        }
        let now = container.entry_factory().now();
        match container.peek(key) {
            Some(entry) if entry.is_expired(now) => {
                if touch {
                    container.remove_expired(key);
                }
                StoreRead::Expired(entry)
            }
            Some(_) if touch => match container.get(key) {
                Some(live) => StoreRead::Live(live),
                None => StoreRead::Absent,
            },
            Some(entry) => StoreRead::Live(entry),
            None => StoreRead::Absent,
        }
    }

    fn record_version_read(&mut self, key: &Key, read: &StoreRead) {
        if !self.versioning {
            return;
        }
        let version = match read {
            StoreRead::Live(e) | StoreRead::Expired(e) => e.version().copied(),
            StoreRead::Absent => None,
        }
        .or(self.non_existing_version);
        if let Some(version) = version {
            self.versions_read.insert(key.clone(), version);
        }
    }

    fn wrap(&self, key: &Key, read: &StoreRead) -> ContextEntry {
        let mut entry = match read {
            StoreRead::Live(e) => ContextEntry::wrap(key.clone(), Some(e), self.isolation),
            StoreRead::Expired(e) => ContextEntry::wrap_expired(key.clone(), e, self.isolation),
            StoreRead::Absent => ContextEntry::wrap(key.clone(), None, self.isolation),
        };
        let seen = if self.versioning {
            self.versions_read.get(key).copied()
        } else {
            None
        };
        entry.set_version_seen(seen);
        entry
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read `key` through the context.
    ///
    /// Repeatable-read serves every key after its first read from the
    /// context, caching absent keys as [`NullEntry`]. Read-committed re-reads
    /// unchanged entries from `container` on every call.
    pub fn get(&mut self, key: &Key, container: &dyn DataContainer) -> Result<Option<Value>> {
        self.ensure_active()?;

        let refresh = self.isolation == IsolationLevel::ReadCommitted;
        let needs_store = match self.entries.get(key) {
            Some(LookedUpEntry::Context(e)) => refresh && !e.is_changed() && !e.skip_lookup(),
            Some(_) => false,
            None => true,
        };
        if !needs_store {
            return Ok(self.entries.get(key).and_then(|e| e.value().cloned()));
        }

        let read = self.read_store(key, container, true);
        if let Some(LookedUpEntry::Context(entry)) = self.entries.get_mut(key) {
            let stored = match &read {
                StoreRead::Live(e) => Some(e),
                _ => None,
            };
            entry.refresh(stored);
            return Ok(entry.value().cloned());
        }

        self.record_version_read(key, &read);
        let entry = match (&read, self.isolation) {
            (StoreRead::Absent, IsolationLevel::RepeatableRead) => LookedUpEntry::Null(NullEntry),
            (StoreRead::Absent, IsolationLevel::ReadCommitted) => return Ok(None),
            _ => {
                let mut wrapped = self.wrap(key, &read);
                wrapped.set_read(true);
                LookedUpEntry::Context(wrapped)
            }
        };
        trace!(tx = %self.tx_id, key = %key, null = entry.is_null(), "looked up entry");
        let value = entry.value().cloned();
        self.entries.insert(key.clone(), entry);
        Ok(value)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn entry_for_write(&mut self, key: &Key, container: &dyn DataContainer) -> &mut LookedUpEntry {
        let needs_wrap = matches!(
            self.entries.get(key),
            None | Some(LookedUpEntry::Null(_)) | Some(LookedUpEntry::AsyncRemoval(_))
        );
        if needs_wrap {
            let read = match self.entries.get(key) {
                Some(_) => StoreRead::Absent,
                None => self.read_store(key, container, false),
            };
            let wrapped = self.wrap(key, &read);
            self.entries.insert(key.clone(), LookedUpEntry::Context(wrapped));
        }
        self.entries
            .entry(key.clone())
            .or_insert_with(|| LookedUpEntry::Null(NullEntry))
    }

    /// Buffer a write with the default metadata
    pub fn put(&mut self, key: Key, value: Value, container: &dyn DataContainer) -> Result<()> {
        let metadata = self.default_metadata;
        self.put_with_metadata(key, value, metadata, container)
    }

    /// Buffer a write with explicit metadata
    pub fn put_with_metadata(
        &mut self,
        key: Key,
        value: Value,
        metadata: Metadata,
        container: &dyn DataContainer,
    ) -> Result<()> {
        self.ensure_active()?;
        let tx = self.tx_id;
        let entry = self.entry_for_write(&key, container);
        entry.set_value(Some(value));
        entry.set_metadata(metadata);
        trace!(tx = %tx, key = %key, "buffered put");
        Ok(())
    }

    /// Buffer a removal, returning the value the transaction saw
    pub fn remove(&mut self, key: &Key, container: &dyn DataContainer) -> Result<Option<Value>> {
        self.ensure_active()?;
        let entry = self.entry_for_write(key, container);
        let previous = entry.value().cloned();
        entry.set_value(None);
        entry.set_removed(true);
        entry.set_changed(true);
        trace!(tx = %self.tx_id, key = %key, "buffered remove");
        Ok(previous)
    }

    /// Buffer an eviction
    pub fn evict(&mut self, key: &Key, container: &dyn DataContainer) -> Result<()> {
        self.ensure_active()?;
        let entry = self.entry_for_write(key, container);
        entry.set_evicted(true);
        entry.set_changed(true);
        trace!(tx = %self.tx_id, key = %key, "buffered evict");
        Ok(())
    }

    /// Buffer a clear of the whole container.
    ///
    /// Entries touched so far are dropped; writes made after the clear are
    /// applied after it at commit.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.entries.clear();
        self.clear = Some(ClearEntry);
        trace!(tx = %self.tx_id, "buffered clear");
        Ok(())
    }

    /// Queue a delta for `key`.
    ///
    /// A pending plain write absorbs the delta directly; otherwise the key's
    /// working copy becomes a [`DeltaAwareEntry`].
    pub fn append_delta(
        &mut self,
        key: &Key,
        delta: Delta,
        container: &dyn DataContainer,
    ) -> Result<()> {
        self.ensure_active()?;
        let metadata = self.default_metadata;

        let replacement = match self.entries.get_mut(key) {
            Some(LookedUpEntry::Delta(entry)) => return entry.append_delta(delta),
            Some(LookedUpEntry::Context(entry)) if entry.is_changed() => {
                let merged = delta.merge(entry.value().cloned())?;
                entry.set_value(Some(merged));
                return Ok(());
            }
            Some(LookedUpEntry::Context(entry)) => DeltaAwareEntry::new(
                key.clone(),
                entry.value().cloned(),
                entry.metadata().copied().unwrap_or(metadata),
            ),
            Some(LookedUpEntry::Null(_)) | Some(LookedUpEntry::AsyncRemoval(_)) => {
                DeltaAwareEntry::new(key.clone(), None, metadata)
            }
            None => {
                let value = match self.read_store(key, container, true) {
                    StoreRead::Live(e) => e.value().cloned(),
                    StoreRead::Expired(_) | StoreRead::Absent => None,
                };
                DeltaAwareEntry::new(key.clone(), value, metadata)
            }
        };

        let mut entry = replacement;
        entry.append_delta(delta)?;
        trace!(tx = %self.tx_id, key = %key, "queued delta");
        self.entries.insert(key.clone(), LookedUpEntry::Delta(entry));
        Ok(())
    }

    /// Hold `key` as absent while its async removal is in flight
    pub fn record_async_removal(&mut self, marker: AsyncRemovalMarker) -> Result<()> {
        self.ensure_active()?;
        let Some(key) = marker.key().cloned() else {
            return Ok(());
        };
        trace!(tx = %self.tx_id, key = %key, batch = marker.batch(), "recorded async removal");
        self.entries.insert(key, LookedUpEntry::AsyncRemoval(marker));
        Ok(())
    }

    /// Drop markers whose removal `tracker` reports complete, so the next
    /// read of those keys consults the store again. Returns how many were
    /// released.
    pub fn release_completed_removals(&mut self, tracker: &AsyncBatchTracker) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| match entry {
            LookedUpEntry::AsyncRemoval(marker) => !marker.is_complete(tracker),
            _ => true,
        });
        before - self.entries.len()
    }

    // ========================================================================
    // Commit / rollback
    // ========================================================================

    pub(crate) fn changed_entries_mut(&mut self) -> impl Iterator<Item = (&Key, &mut LookedUpEntry)> {
        self.entries.iter_mut().filter(|(_, e)| e.is_changed())
    }

    pub(crate) fn changed_entries(&self) -> impl Iterator<Item = (&Key, &LookedUpEntry)> {
        self.entries.iter().filter(|(_, e)| e.is_changed())
    }

    /// Check queued deltas against the container before anything is applied
    pub fn prepare(&self, container: &dyn DataContainer) -> Result<()> {
        for (_, entry) in self.changed_entries() {
            if let LookedUpEntry::Delta(delta) = entry {
                delta.prepare(container)?;
            }
        }
        Ok(())
    }

    /// Apply every change to `container`: a pending clear first, then each
    /// changed key through its own `compute`.
    pub fn commit(&mut self, container: &dyn DataContainer) -> Result<()> {
        if !matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        ) {
            return Err(Error::TransactionNotActive(format!(
                "{} ({:?})",
                self.tx_id, self.status
            )));
        }

        if let Some(mut clear) = self.clear.take() {
            clear.commit(container)?;
        }
        let mut applied = 0usize;
        for (key, entry) in self.entries.iter_mut() {
            if !entry.is_changed() {
                continue;
            }
            if let Err(e) = entry.commit(container) {
                error!(tx = %self.tx_id, key = %key, error = %e, applied, "entry commit failed");
                return Err(e);
            }
            applied += 1;
        }

        self.status = TransactionStatus::Committed;
        debug!(tx = %self.tx_id, applied, "transaction committed");
        Ok(())
    }

    /// Discard every change and end the transaction
    pub fn rollback(&mut self) {
        self.abort("rolled back");
    }

    pub(crate) fn abort(&mut self, reason: impl Into<String>) {
        for entry in self.entries.values_mut() {
            entry.rollback();
        }
        self.entries.clear();
        self.clear = None;
        let reason = reason.into();
        debug!(tx = %self.tx_id, reason = %reason, "transaction aborted");
        self.status = TransactionStatus::Aborted { reason };
    }
}
