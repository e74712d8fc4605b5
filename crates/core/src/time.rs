//! Time source
//!
//! Every timestamp in the cache (creation, last use, expiry checks) comes
//! from a [`TimeService`], never straight from the OS clock, so expiration
//! can be driven deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

/// Wall-clock source in milliseconds since the Unix epoch.
pub trait TimeService: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time in milliseconds
    fn wall_clock_time(&self) -> i64;
}

/// Real clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn wall_clock_time(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock.
///
/// # Examples
///
/// ```
/// use strata_cache_core::time::{ControlledTimeService, TimeService};
///
/// let clock = ControlledTimeService::new(1_000);
/// clock.advance(500);
/// assert_eq!(clock.wall_clock_time(), 1_500);
/// ```
#[derive(Debug, Default)]
pub struct ControlledTimeService {
    now: AtomicI64,
}

impl ControlledTimeService {
    /// Start the clock at `start` milliseconds
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move the clock forward by `millis`
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl TimeService for ControlledTimeService {
    fn wall_clock_time(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
