//! Entry versions and version generation
//!
//! Versions are opaque tokens compared with a four-way outcome. Two kinds
//! exist side by side:
//!
//! - [`EntryVersion::Numeric`]: a plain counter, used by local caches
//! - [`EntryVersion::Clustered`]: a `(topology_id, counter)` pair, used when
//!   the version of record lives on a remote owner
//!
//! Comparing versions of different kinds is `Conflicting`: neither can be
//! ordered against the other.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Outcome of comparing two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionComparison {
    /// `self` is older than `other`
    Before,
    /// `self` is newer than `other`
    After,
    /// Same version
    Equal,
    /// The versions cannot be ordered
    Conflicting,
}

/// Version stamp attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryVersion {
    /// Local counter version
    Numeric(u64),
    /// Topology-aware version
    Clustered {
        /// Topology in which the version was generated
        topology_id: u32,
        /// Counter within the topology
        version: u64,
    },
}

impl EntryVersion {
    /// Compare `self` against `other`.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache_core::version::{EntryVersion, VersionComparison};
    ///
    /// let v1 = EntryVersion::Numeric(1);
    /// let v2 = EntryVersion::Numeric(2);
    /// assert_eq!(v2.compare_to(&v1), VersionComparison::After);
    /// ```
    pub fn compare_to(&self, other: &EntryVersion) -> VersionComparison {
        match (self, other) {
            (EntryVersion::Numeric(a), EntryVersion::Numeric(b)) => order(a.cmp(b)),
            (
                EntryVersion::Clustered {
                    topology_id: t1,
                    version: v1,
                },
                EntryVersion::Clustered {
                    topology_id: t2,
                    version: v2,
                },
            ) => order(t1.cmp(t2).then(v1.cmp(v2))),
            _ => VersionComparison::Conflicting,
        }
    }

    /// Counter component of the version
    pub fn counter(&self) -> u64 {
        match self {
            EntryVersion::Numeric(v) => *v,
            EntryVersion::Clustered { version, .. } => *version,
        }
    }
}

fn order(o: std::cmp::Ordering) -> VersionComparison {
    match o {
        std::cmp::Ordering::Less => VersionComparison::Before,
        std::cmp::Ordering::Greater => VersionComparison::After,
        std::cmp::Ordering::Equal => VersionComparison::Equal,
    }
}

impl fmt::Display for EntryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryVersion::Numeric(v) => write!(f, "v{}", v),
            EntryVersion::Clustered {
                topology_id,
                version,
            } => write!(f, "t{}:v{}", topology_id, version),
        }
    }
}

/// Source of fresh versions.
///
/// Implementations are shared between transactions and must be thread-safe.
/// Both generating methods fail with `IllegalState` once the counter space
/// is exhausted.
pub trait VersionGenerator: Send + Sync {
    /// Generate a version for an entry written for the first time
    fn generate_new(&self) -> Result<EntryVersion>;

    /// Generate the successor of `initial`
    fn increment(&self, initial: &EntryVersion) -> Result<EntryVersion>;

    /// Distinguished version meaning "key never existed"
    fn non_existing_version(&self) -> EntryVersion;
}

fn exhausted() -> Error {
    Error::IllegalState("entry version counter exhausted".to_string())
}

fn next_counter(counter: &AtomicU64) -> Result<u64> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_add(1))
        .map(|prev| prev + 1)
        .map_err(|_| exhausted())
}

/// Counter-based generator for local caches.
///
/// `non_existing_version()` is `Numeric(0)`; generated versions start at 1.
#[derive(Debug, Default)]
pub struct NumericVersionGenerator {
    counter: AtomicU64,
}

impl NumericVersionGenerator {
    /// Create a generator starting from zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator resuming after `last` (e.g. after recovery)
    pub fn starting_after(last: u64) -> Self {
        Self {
            counter: AtomicU64::new(last),
        }
    }
}

impl VersionGenerator for NumericVersionGenerator {
    fn generate_new(&self) -> Result<EntryVersion> {
        next_counter(&self.counter).map(EntryVersion::Numeric)
    }

    fn increment(&self, initial: &EntryVersion) -> Result<EntryVersion> {
        match initial {
            EntryVersion::Numeric(v) => {
                let next = v.checked_add(1).ok_or_else(exhausted)?;
                self.counter.fetch_max(next, Ordering::SeqCst);
                Ok(EntryVersion::Numeric(next))
            }
            EntryVersion::Clustered { .. } => self.generate_new(),
        }
    }

    fn non_existing_version(&self) -> EntryVersion {
        EntryVersion::Numeric(0)
    }
}

/// Topology-aware generator for clustered caches.
///
/// Versions generated after a topology change order after every version of
/// the previous topology.
#[derive(Debug, Default)]
pub struct ClusteredVersionGenerator {
    topology_id: AtomicU32,
    counter: AtomicU64,
}

impl ClusteredVersionGenerator {
    /// Create a generator for the given topology
    pub fn new(topology_id: u32) -> Self {
        Self {
            topology_id: AtomicU32::new(topology_id),
            counter: AtomicU64::new(0),
        }
    }

    /// Current topology id
    pub fn topology_id(&self) -> u32 {
        self.topology_id.load(Ordering::Acquire)
    }

    /// Install a new topology
    pub fn set_topology_id(&self, topology_id: u32) {
        self.topology_id.store(topology_id, Ordering::Release);
    }
}

impl VersionGenerator for ClusteredVersionGenerator {
    fn generate_new(&self) -> Result<EntryVersion> {
        Ok(EntryVersion::Clustered {
            topology_id: self.topology_id(),
            version: next_counter(&self.counter)?,
        })
    }

    fn increment(&self, initial: &EntryVersion) -> Result<EntryVersion> {
        match initial {
            EntryVersion::Clustered { version, .. } => Ok(EntryVersion::Clustered {
                topology_id: self.topology_id(),
                version: version.checked_add(1).ok_or_else(exhausted)?,
            }),
            EntryVersion::Numeric(_) => self.generate_new(),
        }
    }

    fn non_existing_version(&self) -> EntryVersion {
        EntryVersion::Clustered {
            topology_id: 0,
            version: 0,
        }
    }
}
