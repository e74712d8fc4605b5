//! Write-Skew Tests
//!
//! Versioned repeatable-read transactions must not commit a write to a key
//! whose version of record moved after they read it.

use crate::common::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_cache::prelude::*;
use strata_cache::strata_cache_concurrency::{
    ContainerEntryLoader, EntryLoader, InvocationContext, LoadHint, TransactionStatus,
};
use strata_cache::strata_cache_core::{Error as CoreError, Result as CoreResult};
use strata_cache::strata_cache_storage::{DataContainer, StoredEntry};

// =============================================================================
// LOCAL VALIDATION
// =============================================================================

#[test]
fn test_unchanged_version_commits() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();
    let v0 = cache.version_of("k");

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    tx.put("k", 2i64).unwrap();
    tx.commit().unwrap();

    assert_ne!(cache.version_of("k"), v0);
    assert!(cache.version_of("k").is_some());
}

#[test]
fn test_moved_version_is_write_skew() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    cache.put("k", 10i64).unwrap();
    tx.put("k", 2i64).unwrap();

    let err = tx.commit().unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(10)));
}

#[test]
fn test_blind_write_passes_regardless() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.put("k", 2i64).unwrap();
    cache.put("k", 10i64).unwrap();
    tx.commit().unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_read_only_transaction_never_conflicts() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    cache.put("k", 10i64).unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_removal_is_checked_too() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    cache.put("k", 10i64).unwrap();
    tx.remove("k").unwrap();

    assert!(tx.commit().unwrap_err().is_conflict());
    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(10)));
}

#[test]
fn test_removed_and_recreated_key_conflicts() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    cache.remove("k").unwrap();
    cache.put("k", 1i64).unwrap();
    tx.put("k", 2i64).unwrap();

    // same value, newer version
    assert!(tx.commit().unwrap_err().is_conflict());
}

#[test]
fn test_expired_read_tolerates_missing_key() {
    let cache = TestCache::new();
    cache
        .put_with_metadata("k", 1i64, Metadata::builder().lifespan(10).build())
        .unwrap();
    cache.advance(11);

    let mut tx = cache.begin();
    assert!(tx.get("k").unwrap().is_none());
    tx.put("k", 2i64).unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_unversioned_cache_never_checks() {
    let cache = TestCache::with(|b| b.versioning(false));
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    cache.put("k", 10i64).unwrap();
    tx.put("k", 2i64).unwrap();
    tx.commit().unwrap();
}

// =============================================================================
// POLICIES
// =============================================================================

/// Reader that saw version 50 while the store now holds version 40.
fn newer_seen_than_current(cache: &TestCache) -> Transaction<'_> {
    let versioned = |v| Metadata::builder().version(EntryVersion::Numeric(v)).build();
    cache.container().put(Key::from("k"), Value::Int(1), versioned(50));

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    // the store moves backwards under the reader
    cache.container().put(Key::from("k"), Value::Int(1), versioned(40));
    tx.put("k", 2i64).unwrap();
    tx
}

#[test]
fn test_strict_policy_rejects_older_current() {
    let cache = TestCache::with(|b| b.write_skew_policy(WriteSkewPolicy::Strict));
    let tx = newer_seen_than_current(&cache);
    assert!(tx.commit().unwrap_err().is_conflict());
}

#[test]
fn test_tolerant_policy_accepts_older_current() {
    let cache = TestCache::with(|b| b.write_skew_policy(WriteSkewPolicy::Tolerant));
    let tx = newer_seen_than_current(&cache);
    tx.commit().unwrap();
}

// =============================================================================
// REMOTE VALIDATION
// =============================================================================

/// Loader that answers from a container standing in for the owner.
struct OwnerLoader {
    owner: Arc<dyn DataContainer>,
    calls: AtomicUsize,
}

#[async_trait]
impl EntryLoader for OwnerLoader {
    async fn load_and_store_in_data_container(
        &self,
        _ctx: &InvocationContext,
        key: &Key,
        _segment: u32,
        hint: LoadHint,
    ) -> CoreResult<Option<StoredEntry>> {
        assert_eq!(hint, LoadHint::WriteSkewCheck);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.owner.peek(key))
    }
}

/// Loader whose owner never answers.
struct SilentLoader;

#[async_trait]
impl EntryLoader for SilentLoader {
    async fn load_and_store_in_data_container(
        &self,
        _ctx: &InvocationContext,
        key: &Key,
        _segment: u32,
        _hint: LoadHint,
    ) -> CoreResult<Option<StoredEntry>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(CoreError::RemoteResolution {
            key: key.clone(),
            reason: "unreachable".into(),
        })
    }
}

#[tokio::test]
async fn test_remote_commit_passes_when_owner_agrees() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();
    let loader = ContainerEntryLoader::new(Arc::clone(cache.container()));

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    tx.put("k", 2i64).unwrap();
    tx.commit_with_loader(&loader).await.map_err(|(e, _)| e).unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(2)));
}

#[tokio::test]
async fn test_remote_commit_fails_when_owner_moved() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();
    let owner = Arc::new(
        strata_cache::strata_cache_storage::ShardedContainer::new(
            4,
            Arc::new(strata_cache::strata_cache_core::ControlledTimeService::new(T0)),
        ),
    );
    owner.put(
        Key::from("k"),
        Value::Int(99),
        Metadata::builder().version(EntryVersion::Numeric(77)).build(),
    );
    let loader = OwnerLoader {
        owner,
        calls: AtomicUsize::new(0),
    };

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    tx.put("k", 2i64).unwrap();
    let (err, handed_back) = tx.commit_with_loader(&loader).await.unwrap_err();

    assert!(err.is_conflict());
    assert!(handed_back.is_none());
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(1)));
}

#[tokio::test(start_paused = true)]
async fn test_remote_timeout_is_transient_and_retryable() {
    let cache = TestCache::with(|b| b.remote_timeout(Duration::from_millis(100)));
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.get("k").unwrap();
    tx.put("k", 2i64).unwrap();

    let (err, handed_back) = tx.commit_with_loader(&SilentLoader).await.unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_conflict());

    // the transaction survives and can still commit locally
    let tx = handed_back.expect("transaction handed back on transient failure");
    assert_eq!(tx.status(), &TransactionStatus::Active);
    tx.commit().unwrap();
    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(2)));
}
