//! Write-skew validation
//!
//! A repeatable-read transaction that read a key at version `seen` may only
//! commit a write to that key if `seen` is still the version of record.
//!
//! ## Algorithm
//!
//! ```text
//! 1. no version seen (blind write)          -> pass
//! 2. resolve current:
//!      local:  entry in the container (read under its segment lock),
//!              else the remembered remote version,
//!              else non_existing
//!      remote: remembered version, else EntryLoader fetch (bounded by timeout)
//!    an existing entry without a version is an invariant violation
//! 3. current == non_existing -> pass iff seen == non_existing, or the
//!    entry was expired when read
//!    otherwise               -> WriteSkewPolicy::accepts(current vs seen)
//! ```

use crate::context::InvocationContext;
use crate::loader::{EntryLoader, LoadHint};
use std::sync::Arc;
use std::time::Duration;
use strata_cache_core::{
    CacheConfig, EntryVersion, Error, Key, Result, VersionGenerator, WriteSkewPolicy,
};
use strata_cache_storage::DataContainer;
use tracing::{error, warn};

/// Type of conflict detected during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// The version of record moved past the version the transaction read
    WriteSkew {
        /// Conflicting key
        key: Key,
        /// Version observed at read time
        seen: EntryVersion,
        /// Version of record at validation time
        current: EntryVersion,
    },
}

impl ConflictType {
    /// Key the conflict is about
    pub fn key(&self) -> &Key {
        match self {
            ConflictType::WriteSkew { key, .. } => key,
        }
    }

    /// Convert into the error reported to callers
    pub fn into_error(self) -> Error {
        match self {
            ConflictType::WriteSkew { key, seen, current } => Error::WriteSkew { key, seen, current },
        }
    }
}

/// Result of validating a transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A passing result
    pub fn ok() -> Self {
        Self::default()
    }

    /// A result carrying one conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        Self {
            conflicts: vec![conflict],
        }
    }

    /// True if no conflicts were found
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// All conflicts found
    pub fn conflicts(&self) -> &[ConflictType] {
        &self.conflicts
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// `Ok` if valid, else the first conflict as an error
    pub fn into_result(self) -> Result<()> {
        match self.conflicts.into_iter().next() {
            None => Ok(()),
            Some(conflict) => Err(conflict.into_error()),
        }
    }
}

/// Compares versions seen against versions of record.
pub struct WriteSkewValidator {
    generator: Arc<dyn VersionGenerator>,
    policy: WriteSkewPolicy,
    remote_timeout: Duration,
}

impl WriteSkewValidator {
    /// Validator using `generator` for the non-existing version
    pub fn new(generator: Arc<dyn VersionGenerator>, policy: WriteSkewPolicy) -> Self {
        Self {
            generator,
            policy,
            remote_timeout: strata_cache_core::config::DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Validator configured from `config`
    pub fn from_config(config: &CacheConfig, generator: Arc<dyn VersionGenerator>) -> Self {
        Self::new(generator, config.write_skew_policy()).with_remote_timeout(config.remote_timeout())
    }

    /// Bound remote resolution
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Comparison rule in force
    pub fn policy(&self) -> WriteSkewPolicy {
        self.policy
    }

    /// Judge `seen` against an already-resolved `current` version.
    pub fn judge(
        &self,
        key: &Key,
        seen: &EntryVersion,
        current: &EntryVersion,
        expired: bool,
    ) -> ValidationResult {
        let non_existing = self.generator.non_existing_version();
        let passed = if *current == non_existing {
            expired || *seen == non_existing
        } else {
            self.policy.accepts(current.compare_to(seen))
        };

        if passed {
            ValidationResult::ok()
        } else {
            warn!(key = %key, seen = %seen, current = %current, "write skew detected");
            ValidationResult::conflict(ConflictType::WriteSkew {
                key: key.clone(),
                seen: *seen,
                current: *current,
            })
        }
    }

    /// Validate against the local container.
    ///
    /// The current version is read inside `compute`, under the same segment
    /// lock a commit to `key` would take.
    pub fn check_local(
        &self,
        key: &Key,
        version_seen: Option<&EntryVersion>,
        expired: bool,
        remembered: Option<&EntryVersion>,
        container: &dyn DataContainer,
    ) -> Result<ValidationResult> {
        let Some(seen) = version_seen else {
            return Ok(ValidationResult::ok());
        };

        let mut stored_version = None;
        container.compute(
            key,
            Box::new(|k, current, _| {
                if let Some(entry) = current {
                    match entry.version() {
                        Some(v) => stored_version = Some(*v),
                        None => {
                            error!(key = %k, "stored entry has no version");
                            return Err(Error::missing_version(k));
                        }
                    }
                }
                Ok(current.cloned())
            }),
        )?;

        let current = stored_version
            .or_else(|| remembered.copied())
            .unwrap_or_else(|| self.generator.non_existing_version());
        Ok(self.judge(key, seen, &current, expired))
    }

    /// Resolve the version of record through `loader`.
    ///
    /// A version remembered by `ctx` short-circuits the fetch. A timeout or
    /// loader failure surfaces as [`Error::RemoteResolution`], never as a
    /// write-skew conflict; invariant violations pass through unchanged.
    pub async fn resolve_remote(
        &self,
        ctx: &InvocationContext,
        key: &Key,
        segment: u32,
        loader: &dyn EntryLoader,
    ) -> Result<EntryVersion> {
        if let Some(version) = ctx.remembered_version(key) {
            return Ok(*version);
        }

        let fetch = loader.load_and_store_in_data_container(ctx, key, segment, LoadHint::WriteSkewCheck);
        let loaded = match tokio::time::timeout(self.remote_timeout, fetch).await {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(e)) if e.is_serious() || e.is_transient() => return Err(e),
            Ok(Err(e)) => {
                return Err(Error::RemoteResolution {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(key = %key, timeout = ?self.remote_timeout, "remote version resolution timed out");
                return Err(Error::RemoteResolution {
                    key: key.clone(),
                    reason: format!("timed out after {:?}", self.remote_timeout),
                });
            }
        };

        match loaded {
            Some(entry) => match entry.version() {
                Some(v) => Ok(*v),
                None => {
                    error!(key = %key, "loaded entry has no version");
                    Err(Error::missing_version(key))
                }
            },
            None => Ok(self.generator.non_existing_version()),
        }
    }

    /// Validate against the owner of `segment`, fetching through `loader`.
    pub async fn check_remote(
        &self,
        ctx: &InvocationContext,
        key: &Key,
        version_seen: Option<&EntryVersion>,
        expired: bool,
        segment: u32,
        loader: &dyn EntryLoader,
    ) -> Result<ValidationResult> {
        let Some(seen) = version_seen else {
            return Ok(ValidationResult::ok());
        };
        let current = self.resolve_remote(ctx, key, segment, loader).await?;
        Ok(self.judge(key, seen, &current, expired))
    }
}

impl std::fmt::Debug for WriteSkewValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSkewValidator")
            .field("policy", &self.policy)
            .field("remote_timeout", &self.remote_timeout)
            .finish()
    }
}
