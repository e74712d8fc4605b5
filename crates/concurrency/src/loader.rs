//! Remote entry resolution
//!
//! In a clustered cache the version of record for a key lives on its owner.
//! An [`EntryLoader`] fetches it, stores it in the local container and hands
//! it back. Fetching suspends the calling task rather than blocking a worker
//! thread.

use crate::context::InvocationContext;
use async_trait::async_trait;
use std::sync::Arc;
use strata_cache_core::{Key, Result};
use strata_cache_storage::{DataContainer, StoredEntry};

/// Why a load was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadHint {
    /// Resolving the version of record for a write-skew check
    WriteSkewCheck,
    /// Serving a read
    Read,
}

/// Fetches an entry from its authoritative owner.
#[async_trait]
pub trait EntryLoader: Send + Sync {
    /// Load `key` from the owner of `segment`, store it locally, return it.
    ///
    /// `Ok(None)` means the owner holds no entry for the key.
    async fn load_and_store_in_data_container(
        &self,
        ctx: &InvocationContext,
        key: &Key,
        segment: u32,
        hint: LoadHint,
    ) -> Result<Option<StoredEntry>>;
}

/// Loader for a single-node cache: the local container is the owner.
#[derive(Debug, Clone)]
pub struct ContainerEntryLoader<C> {
    container: Arc<C>,
}

impl<C: DataContainer> ContainerEntryLoader<C> {
    /// Resolve against `container`
    pub fn new(container: Arc<C>) -> Self {
        Self { container }
    }
}

#[async_trait]
impl<C: DataContainer + 'static> EntryLoader for ContainerEntryLoader<C> {
    async fn load_and_store_in_data_container(
        &self,
        _ctx: &InvocationContext,
        key: &Key,
        _segment: u32,
        _hint: LoadHint,
    ) -> Result<Option<StoredEntry>> {
        Ok(self.container.peek(key))
    }
}
