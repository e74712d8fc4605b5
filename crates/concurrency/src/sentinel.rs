//! Sentinel entries and the looked-up entry union
//!
//! [`NullEntry`] and [`ClearEntry`] are stateless, zero-size markers.
//! [`LookedUpEntry`] is what an invocation context stores per key.

use crate::async_marker::AsyncRemovalMarker;
use crate::delta_entry::DeltaAwareEntry;
use crate::entry::{CacheEntry, ContextEntry};
use crate::flags::EntryFlags;
use strata_cache_core::{EntryVersion, Key, Metadata, Result, Value};
use strata_cache_storage::DataContainer;
use tracing::debug;

/// Negative-cache marker: the key was read and found absent.
///
/// Every mutator is a no-op and commit touches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NullEntry;

impl CacheEntry for NullEntry {
    fn key(&self) -> Option<&Key> {
        None
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

/// Pseudo-entry whose commit clears the whole container.
///
/// Always reports changed and removed; it has no key, value or metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClearEntry;

impl CacheEntry for ClearEntry {
    fn key(&self) -> Option<&Key> {
        None
    }

    fn value(&self) -> Option<&Value> {
        None
    }

    fn metadata(&self) -> Option<&Metadata> {
        None
    }

    fn flags(&self) -> EntryFlags {
        EntryFlags::CHANGED | EntryFlags::REMOVED
    }

    fn set_flag(&mut self, _flag: EntryFlags, _on: bool) {}

    fn set_value(&mut self, _value: Option<Value>) {}

    fn set_metadata(&mut self, _metadata: Metadata) {}

    fn commit(&mut self, container: &dyn DataContainer) -> Result<()> {
        container.clear();
        debug!("committed clear");
        Ok(())
    }

    fn rollback(&mut self) {}
}

/// Entry held by an invocation context for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum LookedUpEntry {
    /// Known-absent key (repeatable-read negative cache)
    Null(NullEntry),
    /// Plain working copy
    Context(ContextEntry),
    /// Delta-accumulating working copy
    Delta(DeltaAwareEntry),
    /// Key removed in an async batch that may still be in flight
    AsyncRemoval(AsyncRemovalMarker),
}

impl LookedUpEntry {
    /// Borrow as the capability interface
    pub fn as_entry(&self) -> &dyn CacheEntry {
        match self {
            LookedUpEntry::Null(e) => e,
            LookedUpEntry::Context(e) => e,
            LookedUpEntry::Delta(e) => e,
            LookedUpEntry::AsyncRemoval(e) => e,
        }
    }

    /// Mutably borrow as the capability interface
    pub fn as_entry_mut(&mut self) -> &mut dyn CacheEntry {
        match self {
            LookedUpEntry::Null(e) => e,
            LookedUpEntry::Context(e) => e,
            LookedUpEntry::Delta(e) => e,
            LookedUpEntry::AsyncRemoval(e) => e,
        }
    }

    /// Version observed at read time, for entries that track one
    pub fn version_seen(&self) -> Option<&EntryVersion> {
        match self {
            LookedUpEntry::Context(e) => e.version_seen(),
            LookedUpEntry::Null(_) | LookedUpEntry::Delta(_) | LookedUpEntry::AsyncRemoval(_) => {
                None
            }
        }
    }

    /// True for delta-accumulating entries
    pub fn is_delta(&self) -> bool {
        matches!(self, LookedUpEntry::Delta(_))
    }
}

impl CacheEntry for LookedUpEntry {
    fn key(&self) -> Option<&Key> {
        self.as_entry().key()
    }

    fn value(&self) -> Option<&Value> {
        self.as_entry().value()
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.as_entry().metadata()
    }

    fn flags(&self) -> EntryFlags {
        self.as_entry().flags()
    }

    fn set_flag(&mut self, flag: EntryFlags, on: bool) {
        self.as_entry_mut().set_flag(flag, on);
    }

    fn set_value(&mut self, value: Option<Value>) {
        self.as_entry_mut().set_value(value);
    }

    fn set_metadata(&mut self, metadata: Metadata) {
        self.as_entry_mut().set_metadata(metadata);
    }

    fn commit(&mut self, container: &dyn DataContainer) -> Result<()> {
        self.as_entry_mut().commit(container)
    }

    fn rollback(&mut self) {
        self.as_entry_mut().rollback();
    }

    fn is_null(&self) -> bool {
        self.as_entry().is_null()
    }

    fn skip_lookup(&self) -> bool {
        self.as_entry().skip_lookup()
    }
}

impl From<ContextEntry> for LookedUpEntry {
    fn from(entry: ContextEntry) -> Self {
        LookedUpEntry::Context(entry)
    }
}

impl From<DeltaAwareEntry> for LookedUpEntry {
    fn from(entry: DeltaAwareEntry) -> Self {
        LookedUpEntry::Delta(entry)
    }
}

impl From<AsyncRemovalMarker> for LookedUpEntry {
    fn from(entry: AsyncRemovalMarker) -> Self {
        LookedUpEntry::AsyncRemoval(entry)
    }
}

impl From<NullEntry> for LookedUpEntry {
    fn from(entry: NullEntry) -> Self {
        LookedUpEntry::Null(entry)
    }
}
