//! Transaction-local entries
//!
//! A transaction never edits the shared store directly. The first time a
//! command touches a key, the key's stored entry (or its absence) is wrapped
//! in a working copy that implements [`CacheEntry`]. Reads and writes go to
//! the working copy; `commit` pushes it into the container with a single
//! per-key `compute`, `rollback` restores the snapshot.
//!
//! Isolation is a property of the working copy rather than a separate type:
//!
//! - read-committed: reads of an unchanged entry may re-consult the store,
//!   and no snapshot is restored on retry
//! - repeatable-read: the first write sets `SKIP_LOOKUP`, and the snapshot
//!   taken at wrap time backs `reset_current_value` / `update_previous_value`

use crate::flags::EntryFlags;
use strata_cache_core::{
    EntryVersion, IsolationLevel, Key, Metadata, PrivateMetadata, Result, Value,
};
use strata_cache_storage::{DataContainer, EntryFactory, StoredEntry};
use tracing::{debug, trace};

/// Stored result of removing `key` when the container holds `current`.
///
/// A versioned removal of an existing entry leaves a tombstone stamped with
/// the removal's version. Removing an absent key stores nothing.
pub(crate) fn removal_entry(
    key: &Key,
    current: Option<&StoredEntry>,
    version: Option<EntryVersion>,
    factory: &EntryFactory,
) -> Option<StoredEntry> {
    match (current, version) {
        (Some(_), Some(version)) => {
            Some(factory.create_tombstone(key.clone(), PrivateMetadata::with_version(version)))
        }
        _ => None,
    }
}

/// Capability interface shared by every transaction-local entry.
pub trait CacheEntry {
    /// Key of the entry, `None` for key-less sentinels
    fn key(&self) -> Option<&Key>;

    /// Current working value
    fn value(&self) -> Option<&Value>;

    /// Current working metadata
    fn metadata(&self) -> Option<&Metadata>;

    /// State bits
    fn flags(&self) -> EntryFlags;

    /// Set or clear one or more state bits
    fn set_flag(&mut self, flag: EntryFlags, on: bool);

    /// Replace the working value
    fn set_value(&mut self, value: Option<Value>);

    /// Replace the working metadata
    fn set_metadata(&mut self, metadata: Metadata);

    /// Push the working copy into `container`
    fn commit(&mut self, container: &dyn DataContainer) -> Result<()>;

    /// Discard the working copy
    fn rollback(&mut self);

    /// True for the negative-cache marker
    fn is_null(&self) -> bool {
        false
    }

    /// Working copy differs from what was read
    fn is_changed(&self) -> bool {
        self.flags().contains(EntryFlags::CHANGED)
    }

    /// Key did not exist when first touched
    fn is_created(&self) -> bool {
        self.flags().contains(EntryFlags::CREATED)
    }

    /// Key is removed on commit
    fn is_removed(&self) -> bool {
        self.flags().contains(EntryFlags::REMOVED)
    }

    /// Key is evicted on commit
    fn is_evicted(&self) -> bool {
        self.flags().contains(EntryFlags::EVICTED)
    }

    /// Working copy is usable
    fn is_valid(&self) -> bool {
        self.flags().contains(EntryFlags::VALID)
    }

    /// Stored entry had expired when read
    fn is_expired(&self) -> bool {
        self.flags().contains(EntryFlags::EXPIRED)
    }

    /// Entry was read by the transaction
    fn is_read(&self) -> bool {
        self.flags().contains(EntryFlags::READ)
    }

    /// Reads must not re-consult the shared store
    fn skip_lookup(&self) -> bool {
        self.flags().contains(EntryFlags::SKIP_LOOKUP)
    }

    /// Mark the entry changed
    fn set_changed(&mut self, on: bool) {
        self.set_flag(EntryFlags::CHANGED, on);
    }

    /// Mark the entry created
    fn set_created(&mut self, on: bool) {
        self.set_flag(EntryFlags::CREATED, on);
    }

    /// Mark the entry removed
    fn set_removed(&mut self, on: bool) {
        self.set_flag(EntryFlags::REMOVED, on);
    }

    /// Mark the entry evicted
    fn set_evicted(&mut self, on: bool) {
        self.set_flag(EntryFlags::EVICTED, on);
    }

    /// Mark the entry valid
    fn set_valid(&mut self, on: bool) {
        self.set_flag(EntryFlags::VALID, on);
    }

    /// Mark the entry expired
    fn set_expired(&mut self, on: bool) {
        self.set_flag(EntryFlags::EXPIRED, on);
    }

    /// Mark the entry read
    fn set_read(&mut self, on: bool) {
        self.set_flag(EntryFlags::READ, on);
    }

    /// Force reads to use the working copy
    fn set_skip_lookup(&mut self, on: bool) {
        self.set_flag(EntryFlags::SKIP_LOOKUP, on);
    }
}

/// Working copy of one key under read-committed or repeatable-read.
///
/// `version_seen` is the version the transaction observed when it first
/// read the key; write-skew validation compares it against the version of
/// record at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    key: Key,
    value: Option<Value>,
    metadata: Metadata,
    old_value: Option<Value>,
    old_metadata: Metadata,
    flags: EntryFlags,
    isolation: IsolationLevel,
    version_seen: Option<EntryVersion>,
}

impl ContextEntry {
    /// Working copy of an explicit value
    pub fn new(
        key: Key,
        value: Option<Value>,
        metadata: Metadata,
        isolation: IsolationLevel,
    ) -> Self {
        let mut flags = EntryFlags::VALID;
        if value.is_none() {
            flags.insert(EntryFlags::CREATED);
        }
        Self {
            key,
            old_value: value.clone(),
            value,
            old_metadata: metadata,
            metadata,
            flags,
            isolation,
            version_seen: None,
        }
    }

    /// Wrap what the container holds for `key`.
    ///
    /// A missing entry or a tombstone wraps as an absent value with
    /// `CREATED` set. The stored version becomes the version seen.
    pub fn wrap(key: Key, stored: Option<&StoredEntry>, isolation: IsolationLevel) -> Self {
        let value = stored.and_then(|e| e.value().cloned());
        let metadata = stored.map(|e| e.metadata()).unwrap_or_default();
        let mut entry = Self::new(key, value, metadata, isolation);
        entry.version_seen = stored.and_then(|e| e.version().copied());
        trace!(key = %entry.key, created = entry.is_created(), "wrapped entry");
        entry
    }

    /// Wrap an entry that was found expired: absent value, `EXPIRED` set.
    pub fn wrap_expired(key: Key, stored: &StoredEntry, isolation: IsolationLevel) -> Self {
        let mut entry = Self::new(key, None, Metadata::immortal(), isolation);
        entry.flags.insert(EntryFlags::EXPIRED);
        entry.version_seen = stored.version().copied();
        trace!(key = %entry.key, "wrapped expired entry");
        entry
    }

    /// Owning key
    pub fn entry_key(&self) -> &Key {
        &self.key
    }

    /// Isolation strategy of this working copy
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Version observed when the key was read
    pub fn version_seen(&self) -> Option<&EntryVersion> {
        self.version_seen.as_ref()
    }

    /// Override the version observed
    pub fn set_version_seen(&mut self, version: Option<EntryVersion>) {
        self.version_seen = version;
    }

    /// Snapshot value
    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    /// Snapshot metadata
    pub fn old_metadata(&self) -> &Metadata {
        &self.old_metadata
    }

    /// Restore the working copy from the snapshot before a retry.
    ///
    /// No-op under read-committed, where a retry simply re-reads.
    pub fn reset_current_value(&mut self) {
        if self.isolation == IsolationLevel::RepeatableRead {
            self.value = self.old_value.clone();
            self.metadata = self.old_metadata;
        }
    }

    /// Promote the working copy to be the new snapshot.
    ///
    /// No-op under read-committed.
    pub fn update_previous_value(&mut self) {
        if self.isolation == IsolationLevel::RepeatableRead {
            self.old_value = self.value.clone();
            self.old_metadata = self.metadata;
        }
    }

    /// Re-read an unchanged read-committed entry from `stored`.
    ///
    /// Returns false, leaving the entry untouched, when the entry has local
    /// changes or reads are pinned to the working copy.
    pub fn refresh(&mut self, stored: Option<&StoredEntry>) -> bool {
        if self.is_changed() || self.skip_lookup() {
            return false;
        }
        self.value = stored.and_then(|e| e.value().cloned());
        self.metadata = stored.map(|e| e.metadata()).unwrap_or_default();
        self.flags.set(EntryFlags::CREATED, self.value.is_none());
        true
    }

    fn reset_flags(&mut self) {
        self.flags = EntryFlags::VALID;
    }
}

impl CacheEntry for ContextEntry {
    fn key(&self) -> Option<&Key> {
        Some(&self.key)
    }

    fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.metadata)
    }

    fn flags(&self) -> EntryFlags {
        self.flags
    }

    fn set_flag(&mut self, flag: EntryFlags, on: bool) {
        self.flags.set(flag, on);
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.isolation == IsolationLevel::RepeatableRead
            && !self.flags.contains(EntryFlags::SKIP_LOOKUP)
        {
            self.flags.insert(EntryFlags::SKIP_LOOKUP);
        }
        if value.is_some() {
            self.flags.remove(EntryFlags::REMOVED | EntryFlags::EVICTED);
        }
        self.value = value;
        self.flags.insert(EntryFlags::CHANGED);
    }

    fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    fn commit(&mut self, container: &dyn DataContainer) -> Result<()> {
        if self.is_changed() {
            if self.is_evicted() {
                container.evict(&self.key);
                debug!(key = %self.key, "committed eviction");
            } else if self.is_removed() {
                let version = self.metadata.version().copied();
                container.compute(
                    &self.key,
                    Box::new(move |k, current, factory| {
                        Ok(removal_entry(k, current, version, factory))
                    }),
                )?;
                debug!(key = %self.key, "committed removal");
            } else if let Some(value) = self.value.as_ref() {
                let metadata = self.metadata;
                container.compute(
                    &self.key,
                    Box::new(move |k, current, factory| {
                        let entry = match current {
                            Some(existing) => factory.update(existing, value.clone(), &metadata),
                            None => factory.create(k.clone(), value.clone(), &metadata),
                        };
                        Ok(Some(entry))
                    }),
                )?;
                debug!(key = %self.key, "committed write");
            }
            self.old_value = self.value.clone();
            self.old_metadata = self.metadata;
        }
        self.reset_flags();
        Ok(())
    }

    fn rollback(&mut self) {
        self.value = self.old_value.clone();
        self.metadata = self.old_metadata;
        self.reset_flags();
        trace!(key = %self.key, "rolled back entry");
    }
}
