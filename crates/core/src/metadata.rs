//! Entry metadata
//!
//! [`Metadata`] carries the user-visible expiration bounds and the optional
//! version of an entry. Durations are milliseconds; `-1` (any negative value)
//! means "unbounded".
//!
//! [`PrivateMetadata`] is the internal stamp the store attaches to entries for
//! causal removal tracking. Tombstones carry nothing else.

use crate::version::EntryVersion;
use serde::{Deserialize, Serialize};

/// Sentinel for "no bound".
pub const UNBOUNDED: i64 = -1;

/// Expiration bounds and version of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metadata {
    lifespan: i64,
    max_idle: i64,
    version: Option<EntryVersion>,
}

impl Metadata {
    /// Metadata for an entry that never expires and carries no version
    pub const fn immortal() -> Self {
        Self {
            lifespan: UNBOUNDED,
            max_idle: UNBOUNDED,
            version: None,
        }
    }

    /// Start building metadata from scratch
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache_core::metadata::Metadata;
    ///
    /// let md = Metadata::builder().lifespan(1000).build();
    /// assert_eq!(md.lifespan(), 1000);
    /// assert_eq!(md.max_idle(), -1);
    /// ```
    pub fn builder() -> MetadataBuilder {
        MetadataBuilder {
            inner: Self::immortal(),
        }
    }

    /// Produce a builder seeded with this metadata (modified copy)
    pub fn to_builder(&self) -> MetadataBuilder {
        MetadataBuilder { inner: *self }
    }

    /// Lifespan in milliseconds, `-1` if unbounded
    pub fn lifespan(&self) -> i64 {
        self.lifespan
    }

    /// Max idle in milliseconds, `-1` if unbounded
    pub fn max_idle(&self) -> i64 {
        self.max_idle
    }

    /// Entry version, if versioning is enabled
    pub fn version(&self) -> Option<&EntryVersion> {
        self.version.as_ref()
    }

    /// True when neither bound is set
    pub fn is_immortal(&self) -> bool {
        self.lifespan < 0 && self.max_idle < 0
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::immortal()
    }
}

/// Builder for [`Metadata`].
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    inner: Metadata,
}

impl MetadataBuilder {
    /// Set the lifespan in milliseconds (negative = unbounded)
    pub fn lifespan(mut self, lifespan: i64) -> Self {
        self.inner.lifespan = normalize(lifespan);
        self
    }

    /// Set the max idle time in milliseconds (negative = unbounded)
    pub fn max_idle(mut self, max_idle: i64) -> Self {
        self.inner.max_idle = normalize(max_idle);
        self
    }

    /// Set the version
    pub fn version(mut self, version: EntryVersion) -> Self {
        self.inner.version = Some(version);
        self
    }

    /// Drop the version
    pub fn no_version(mut self) -> Self {
        self.inner.version = None;
        self
    }

    /// Finish building
    pub fn build(self) -> Metadata {
        self.inner
    }
}

fn normalize(duration: i64) -> i64 {
    if duration < 0 {
        UNBOUNDED
    } else {
        duration
    }
}

/// Internal stamp attached by the store.
///
/// Used for tombstones (removed-but-version-tracked keys) and carried across
/// updates of live entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PrivateMetadata {
    version: Option<EntryVersion>,
    origin_site: Option<String>,
}

impl PrivateMetadata {
    /// Stamp carrying only a version
    pub fn with_version(version: EntryVersion) -> Self {
        Self {
            version: Some(version),
            origin_site: None,
        }
    }

    /// Set the site that produced the change
    pub fn origin_site(mut self, site: impl Into<String>) -> Self {
        self.origin_site = Some(site.into());
        self
    }

    /// Version recorded in the stamp
    pub fn version(&self) -> Option<&EntryVersion> {
        self.version.as_ref()
    }

    /// Site that produced the change
    pub fn site(&self) -> Option<&str> {
        self.origin_site.as_deref()
    }

    /// True when the stamp carries no information
    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.origin_site.is_none()
    }
}
