//! Basic Cache Operations Tests
//!
//! Tests for get, put, remove, evict and clear through the facade.

use crate::common::*;
use strata_cache::prelude::*;

// =============================================================================
// GET / PUT TESTS
// =============================================================================

#[test]
fn test_put_and_get_roundtrip() {
    let cache = TestCache::new();

    cache.put("key1", Value::Int(42)).unwrap();
    assert_eq!(cache.get("key1").unwrap(), Some(Value::Int(42)));
}

#[test]
fn test_get_nonexistent_returns_none() {
    let cache = TestCache::new();
    assert!(cache.get("nonexistent").unwrap().is_none());
}

#[test]
fn test_put_overwrites_existing() {
    let cache = TestCache::new();

    cache.put("key", Value::Int(1)).unwrap();
    cache.put("key", Value::Int(2)).unwrap();
    assert_eq!(cache.get("key").unwrap(), Some(Value::Int(2)));
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_put_all_value_types() {
    let cache = TestCache::new();

    for (name, value) in standard_test_values() {
        let key = format!("type:{}", name);
        cache.put(key.as_str(), value.clone()).unwrap();
        assert_eq!(cache.get(key.as_str()).unwrap(), Some(value), "Failed for type: {}", name);
    }
}

#[test]
fn test_binary_keys() {
    let cache = TestCache::new();
    let key = Key::new(vec![0u8, 159, 146, 150]);

    cache.put(key.clone(), "binary").unwrap();
    assert_eq!(cache.get(key).unwrap(), Some(Value::from("binary")));
}

// =============================================================================
// REMOVE / EVICT / CLEAR TESTS
// =============================================================================

#[test]
fn test_remove_returns_previous_value() {
    let cache = TestCache::new();

    cache.put("key", "v").unwrap();
    assert_eq!(cache.remove("key").unwrap(), Some(Value::from("v")));
    assert_eq!(cache.remove("key").unwrap(), None);
    assert!(!cache.contains_key("key"));
}

#[test]
fn test_versioned_remove_leaves_tombstone() {
    let cache = TestCache::new();

    cache.put("key", "v").unwrap();
    cache.remove("key").unwrap();

    let tomb = cache.peek_entry("key").expect("tombstone retained");
    assert!(tomb.is_tombstone());
    assert!(tomb.version().is_some());
    assert_eq!(cache.size(), 0);
    assert!(cache.get("key").unwrap().is_none());
}

#[test]
fn test_removing_absent_keys_stores_nothing() {
    let cache = TestCache::new();

    for i in 0..1000 {
        assert_eq!(cache.remove(format!("missing-{i}")).unwrap(), None);
    }
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.metrics().entries, 0);
}

#[test]
fn test_purge_tombstones_reclaims_removed_keys() {
    let cache = TestCache::new();

    for i in 0..10 {
        cache.put(format!("k{i}"), i as i64).unwrap();
    }
    for i in 0..5 {
        cache.remove(format!("k{i}")).unwrap();
    }
    assert_eq!(cache.metrics().entries, 10);

    assert_eq!(cache.purge_tombstones(), 5);
    assert_eq!(cache.metrics().entries, 5);
    assert_eq!(cache.size(), 5);
    assert!(cache.peek_entry("k0").is_none());
}

#[test]
fn test_unversioned_remove_drops_entry() {
    let cache = TestCache::with(|b| b.versioning(false));

    cache.put("key", "v").unwrap();
    cache.remove("key").unwrap();
    assert!(cache.peek_entry("key").is_none());
}

#[test]
fn test_put_after_remove_succeeds() {
    let cache = TestCache::new();

    cache.put("key", 1i64).unwrap();
    cache.remove("key").unwrap();
    cache.put("key", 2i64).unwrap();
    assert_eq!(cache.get("key").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_evict_in_transaction() {
    let cache = TestCache::new();
    cache.put("cold", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.evict("cold").unwrap();
    tx.commit().unwrap();

    assert!(cache.peek_entry("cold").is_none());
    assert_eq!(cache.metrics().evictions, 1);
}

#[test]
fn test_clear_in_transaction() {
    let cache = TestCache::new();
    for i in 0..10i64 {
        cache.put(format!("k{}", i), i).unwrap();
    }

    let mut tx = cache.begin();
    tx.clear().unwrap();
    tx.put("survivor", 1i64).unwrap();
    assert!(tx.get("k3").unwrap().is_none());
    tx.commit().unwrap();

    assert_eq!(cache.size(), 1);
    assert_eq!(cache.get("survivor").unwrap(), Some(Value::Int(1)));
}

// =============================================================================
// TRANSACTION LIFECYCLE TESTS
// =============================================================================

#[test]
fn test_transaction_writes_invisible_until_commit() {
    let cache = TestCache::new();

    let mut tx = cache.begin();
    tx.put("key", 1i64).unwrap();
    assert_eq!(tx.get("key").unwrap(), Some(Value::Int(1)));
    assert!(cache.get("key").unwrap().is_none());

    tx.commit().unwrap();
    assert_eq!(cache.get("key").unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_rollback_discards_everything() {
    let cache = TestCache::new();
    cache.put("a", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.put("a", 2i64).unwrap();
    tx.put("b", 2i64).unwrap();
    tx.remove("a").unwrap();
    tx.rollback();

    assert_eq!(cache.get("a").unwrap(), Some(Value::Int(1)));
    assert!(cache.get("b").unwrap().is_none());
}

#[test]
fn test_drop_without_commit_discards() {
    let cache = TestCache::new();
    {
        let mut tx = cache.begin();
        tx.put("a", 1i64).unwrap();
    }
    assert!(cache.get("a").unwrap().is_none());
}

#[test]
fn test_metrics_count_commits_and_aborts() {
    let cache = TestCache::new();
    cache.put("a", 1i64).unwrap();
    cache.begin().rollback();

    let metrics = cache.metrics();
    assert_eq!(metrics.transactions_committed, 1);
    assert_eq!(metrics.transactions_aborted, 1);
    assert_eq!(metrics.entries, 1);
}

#[test]
fn test_reads_are_not_counted_as_commits() {
    let cache = TestCache::new();
    cache.put("a", 1i64).unwrap();

    for _ in 0..10 {
        assert_eq!(cache.get("a").unwrap(), Some(Value::Int(1)));
    }
    let mut tx = cache.begin();
    tx.get("a").unwrap();
    tx.commit().unwrap();

    assert_eq!(cache.metrics().transactions_committed, 1);
    assert_eq!(cache.metrics().transactions_aborted, 0);
}
