//! Delta-aware working copy
//!
//! For accumulator values (counters, field maps, append-only lists) a
//! transaction queues [`Delta`]s instead of overwriting the value. At commit
//! the queue is folded over whatever the container holds at that moment, so
//! concurrent partial updates to one key compose instead of clobbering each
//! other.

use crate::entry::{removal_entry, CacheEntry};
use crate::flags::EntryFlags;
use strata_cache_core::{Delta, DeltaLog, Key, Metadata, Result, Value};
use strata_cache_storage::DataContainer;
use tracing::debug;

/// Working copy that accumulates deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaAwareEntry {
    key: Key,
    value: Option<Value>,
    old_value: Option<Value>,
    base: Option<Value>,
    metadata: Metadata,
    deltas: DeltaLog,
    flags: EntryFlags,
}

impl DeltaAwareEntry {
    /// Wrap the current value of `key`; an absent value marks the entry `CREATED`.
    pub fn new(key: Key, value: Option<Value>, metadata: Metadata) -> Self {
        let mut flags = EntryFlags::VALID;
        if value.is_none() {
            flags.insert(EntryFlags::CREATED);
        }
        Self {
            key,
            old_value: value.clone(),
            value,
            base: None,
            metadata,
            deltas: DeltaLog::new(),
            flags,
        }
    }

    /// Owning key
    pub fn entry_key(&self) -> &Key {
        &self.key
    }

    /// Queued deltas
    pub fn deltas(&self) -> &DeltaLog {
        &self.deltas
    }

    /// Value before the transaction touched the key
    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    /// Queue `delta`, merging it into the local copy when one exists.
    ///
    /// A delta that does not fit the local copy is rejected with
    /// `WrongType` and nothing is queued.
    pub fn append_delta(&mut self, delta: Delta) -> Result<()> {
        let created = self.is_created();
        match self.value.as_mut() {
            Some(local) => delta.apply_to(local)?,
            None if created => self.value = Some(delta.merge(self.base.clone())?),
            None => {}
        }
        self.deltas.push(delta);
        self.flags.insert(EntryFlags::CHANGED);
        Ok(())
    }

    /// Dry-run the commit fold against the container's current value.
    ///
    /// Lets a caller holding the segment locks find type mismatches before any
    /// key of the transaction is applied.
    pub fn prepare(&self, container: &dyn DataContainer) -> Result<()> {
        if !self.is_changed() || self.is_removed() || self.base.is_some() {
            return Ok(());
        }
        let now = container.entry_factory().now();
        let current = container
            .peek(&self.key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.value().cloned());
        if let Some(current) = current {
            self.deltas.fold(Some(current))?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.deltas.clear();
        self.base = None;
        self.old_value = self.value.clone();
        self.flags = EntryFlags::VALID;
    }
}

impl CacheEntry for DeltaAwareEntry {
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

    /// Overwrite the value: queued deltas are dropped and later ones fold
    /// over `value` instead of the stored value.
    fn set_value(&mut self, value: Option<Value>) {
        self.deltas.clear();
        self.base = value.clone();
        if value.is_some() {
            self.flags.remove(EntryFlags::REMOVED | EntryFlags::EVICTED);
        }
        self.value = value;
        self.flags.insert(EntryFlags::CHANGED | EntryFlags::CREATED);
    }

    fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    fn commit(&mut self, container: &dyn DataContainer) -> Result<()> {
        if self.is_changed() {
            let removed = self.is_removed();
            let created = self.is_created();
            let deltas = &self.deltas;
            let base = &self.base;
            let metadata = self.metadata;

            let stored = container.compute(
                &self.key,
                Box::new(move |k, current, factory| {
                    if removed {
                        return Ok(removal_entry(k, current, metadata.version().copied(), factory));
                    }
                    // an expired value of record counts as absent
                    let now = factory.now();
                    let live = current.filter(|e| !e.is_expired(now) && e.value().is_some());
                    let start = match base {
                        Some(value) => Some(value.clone()),
                        None => live.and_then(|e| e.value().cloned()),
                    };
                    let Some(merged) = deltas.fold(start)? else {
                        return Ok(current.cloned());
                    };
                    match live.filter(|_| !created) {
                        Some(existing) => {
                            let mut copy = existing.clone();
                            copy.set_value(merged)?;
                            if let Some(version) = metadata.version() {
                                copy.set_version(Some(*version))?;
                            }
                            Ok(Some(copy))
                        }
                        None => {
                            if !created {
                                debug!(key = %k, "no live value to merge into; folded over empty");
                            }
                            Ok(Some(match current {
                                Some(existing) => factory.update(existing, merged, &metadata),
                                None => factory.create(k.clone(), merged, &metadata),
                            }))
                        }
                    }
                }),
            )?;

            self.value = stored.and_then(|e| e.stored().clone().into_value());
            debug!(key = %self.key, deltas = self.deltas.len(), "committed deltas");
        }
        self.reset();
        Ok(())
    }

    fn rollback(&mut self) {
        self.value = self.old_value.clone();
        self.reset();
    }
}
