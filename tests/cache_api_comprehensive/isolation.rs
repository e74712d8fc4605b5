//! Isolation Tests
//!
//! Repeatable-read and read-committed visibility, including the read-count
//! guarantee of repeatable-read observed through a spy container.

use crate::common::*;
use strata_cache::prelude::*;
use strata_cache::strata_cache_concurrency::{CacheEntry, InvocationContext};
use strata_cache::strata_cache_core::{CacheConfig, TxId};
use strata_cache::strata_cache_storage::DataContainer;

fn context(isolation: IsolationLevel) -> InvocationContext {
    let config = CacheConfig::builder().isolation(isolation).build().unwrap();
    InvocationContext::new(TxId::new(), &config)
}

// =============================================================================
// REPEATABLE READ
// =============================================================================

#[test]
fn test_repeatable_read_snapshot_survives_concurrent_commit() {
    let cache = TestCache::new();
    cache.put("k", 1i64).unwrap();

    let mut reader = cache.begin();
    assert_eq!(reader.get("k").unwrap(), Some(Value::Int(1)));

    cache.put("k", 2i64).unwrap();
    assert_eq!(reader.get("k").unwrap(), Some(Value::Int(1)));
    reader.commit().unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_repeatable_read_absence_is_stable() {
    let cache = TestCache::new();

    let mut reader = cache.begin();
    assert!(reader.get("k").unwrap().is_none());
    cache.put("k", 1i64).unwrap();
    assert!(reader.get("k").unwrap().is_none());
}

#[test]
fn test_skip_lookup_stops_store_reads_after_first_write() {
    let spy = SpyContainer::new();
    spy.put(Key::from("k"), Value::Int(1), Metadata::immortal());
    let mut ctx = context(IsolationLevel::RepeatableRead);

    ctx.get(&Key::from("k"), &spy).unwrap();
    ctx.put(Key::from("k"), Value::Int(2), &spy).unwrap();
    assert!(ctx.lookup_entry(&Key::from("k")).unwrap().skip_lookup());

    let reads = spy.reads();
    for _ in 0..10 {
        assert_eq!(ctx.get(&Key::from("k"), &spy).unwrap(), Some(Value::Int(2)));
    }
    assert_eq!(spy.reads(), reads);
}

#[test]
fn test_null_entry_stops_store_reads() {
    let spy = SpyContainer::new();
    let mut ctx = context(IsolationLevel::RepeatableRead);

    ctx.get(&Key::from("missing"), &spy).unwrap();
    assert!(ctx.lookup_entry(&Key::from("missing")).unwrap().is_null());

    let reads = spy.reads();
    for _ in 0..10 {
        assert!(ctx.get(&Key::from("missing"), &spy).unwrap().is_none());
    }
    assert_eq!(spy.reads(), reads);
}

// =============================================================================
// READ COMMITTED
// =============================================================================

#[test]
fn test_read_committed_sees_later_commits() {
    let cache = TestCache::read_committed();
    cache.put("k", 1i64).unwrap();

    let mut reader = cache.begin();
    assert_eq!(reader.get("k").unwrap(), Some(Value::Int(1)));
    cache.put("k", 2i64).unwrap();
    assert_eq!(reader.get("k").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_read_committed_own_writes_win() {
    let cache = TestCache::read_committed();
    cache.put("k", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.put("k", 5i64).unwrap();
    cache.put("k", 2i64).unwrap();
    assert_eq!(tx.get("k").unwrap(), Some(Value::Int(5)));
}

#[test]
fn test_read_committed_rereads_store() {
    let spy = SpyContainer::new();
    spy.put(Key::from("k"), Value::Int(1), Metadata::immortal());
    let mut ctx = context(IsolationLevel::ReadCommitted);

    ctx.get(&Key::from("k"), &spy).unwrap();
    let reads = spy.reads();
    ctx.get(&Key::from("k"), &spy).unwrap();
    assert!(spy.reads() > reads);
}

#[test]
fn test_read_committed_last_writer_wins() {
    let cache = TestCache::read_committed();
    cache.put("k", 0i64).unwrap();

    let mut t1 = cache.begin();
    let mut t2 = cache.begin();
    t1.get("k").unwrap();
    t2.get("k").unwrap();
    t2.put("k", 2i64).unwrap();
    t2.commit().unwrap();
    t1.put("k", 1i64).unwrap();
    t1.commit().unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(1)));
}
