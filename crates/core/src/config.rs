//! Cache configuration
//!
//! Build a [`CacheConfig`] through [`CacheConfig::builder`]; `build()`
//! validates the combination before anything uses it.

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::version::VersionComparison;
use std::time::Duration;

/// Default number of keyspace segments.
pub const DEFAULT_NUM_SEGMENTS: u32 = 256;

/// Default bound on remote version resolution.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Isolation strategy for transaction-local entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Every read may re-consult the shared store
    ReadCommitted,
    /// Reads are stable for the lifetime of the transaction
    #[default]
    RepeatableRead,
}

/// How a write-skew check judges `current.compare_to(seen)`.
///
/// Both rules exist in the wild; the choice is explicit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WriteSkewPolicy {
    /// Pass only when the versions are `Equal`
    #[default]
    Strict,
    /// Pass unless the current version is `After` the one seen
    Tolerant,
}

impl WriteSkewPolicy {
    /// True when `comparison` (current vs seen) passes under this policy
    pub fn accepts(&self, comparison: VersionComparison) -> bool {
        match self {
            WriteSkewPolicy::Strict => comparison == VersionComparison::Equal,
            WriteSkewPolicy::Tolerant => comparison != VersionComparison::After,
        }
    }
}

/// Validated cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    isolation: IsolationLevel,
    versioning: bool,
    write_skew_policy: WriteSkewPolicy,
    num_segments: u32,
    remote_timeout: Duration,
    default_metadata: Metadata,
}

impl CacheConfig {
    /// Create a builder with default settings.
    ///
    /// # Example
    ///
    /// ```
    /// use strata_cache_core::config::{CacheConfig, IsolationLevel};
    ///
    /// let config = CacheConfig::builder()
    ///     .isolation(IsolationLevel::RepeatableRead)
    ///     .versioning(true)
    ///     .num_segments(16)
    ///     .build()
    ///     .unwrap();
    /// assert!(config.write_skew_check_enabled());
    /// ```
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    /// Isolation level of new contexts
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Whether entries carry versions
    pub fn versioning(&self) -> bool {
        self.versioning
    }

    /// Rule applied by the write-skew check
    pub fn write_skew_policy(&self) -> WriteSkewPolicy {
        self.write_skew_policy
    }

    /// Number of keyspace segments
    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }

    /// Upper bound on remote version resolution
    pub fn remote_timeout(&self) -> Duration {
        self.remote_timeout
    }

    /// Metadata applied when a write supplies none
    pub fn default_metadata(&self) -> Metadata {
        self.default_metadata
    }

    /// Write skew is only checked for versioned repeatable-read caches
    pub fn write_skew_check_enabled(&self) -> bool {
        self.versioning && self.isolation == IsolationLevel::RepeatableRead
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            versioning: false,
            write_skew_policy: WriteSkewPolicy::default(),
            num_segments: DEFAULT_NUM_SEGMENTS,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            default_metadata: Metadata::immortal(),
        }
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    inner: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.inner.isolation = isolation;
        self
    }

    /// Enable or disable entry versioning.
    pub fn versioning(mut self, enabled: bool) -> Self {
        self.inner.versioning = enabled;
        self
    }

    /// Choose the write-skew comparison rule.
    pub fn write_skew_policy(mut self, policy: WriteSkewPolicy) -> Self {
        self.inner.write_skew_policy = policy;
        self
    }

    /// Set the number of keyspace segments (must be > 0).
    pub fn num_segments(mut self, num_segments: u32) -> Self {
        self.inner.num_segments = num_segments;
        self
    }

    /// Bound remote version resolution (must be > 0).
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.inner.remote_timeout = timeout;
        self
    }

    /// Metadata applied to writes that supply none.
    pub fn default_metadata(mut self, metadata: Metadata) -> Self {
        self.inner.default_metadata = metadata;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<CacheConfig> {
        if self.inner.num_segments == 0 {
            return Err(Error::Config("num_segments must be greater than 0".into()));
        }
        if self.inner.remote_timeout.is_zero() {
            return Err(Error::Config("remote_timeout must be non-zero".into()));
        }
        Ok(self.inner)
    }
}
