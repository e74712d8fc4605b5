//! Concurrency Tests
//!
//! Many threads driving one cache: delta increments must all land, and
//! read-modify-write loops that retry on conflict must never lose an update.

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_cache::prelude::*;

const THREADS: usize = 8;
const ROUNDS: usize = 50;

// =============================================================================
// DELTAS
// =============================================================================

#[test]
fn test_concurrent_delta_increments_all_land() {
    let cache = TestCache::new();

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    cache.apply_delta("counter", Delta::Add(1)).unwrap();
                }
            });
        }
    });

    assert_eq!(
        cache.get("counter").unwrap(),
        Some(Value::Int((THREADS * ROUNDS) as i64))
    );
    assert_eq!(
        cache.metrics().transactions_committed,
        (THREADS * ROUNDS) as u64
    );
}

#[test]
fn test_concurrent_appends_keep_every_item() {
    let cache = TestCache::new();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..10 {
                    let item = Value::Int((t * 100 + i) as i64);
                    cache.apply_delta("log", Delta::Append(item)).unwrap();
                }
            });
        }
    });

    let log = cache.get("log").unwrap().unwrap();
    let mut items: Vec<i64> = log
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_int().unwrap())
        .collect();
    items.sort_unstable();
    items.dedup();
    assert_eq!(items.len(), THREADS * 10);
}

// =============================================================================
// READ-MODIFY-WRITE WITH RETRY
// =============================================================================

fn increment_with_retry(cache: &Cache, key: &str, conflicts: &AtomicUsize) {
    loop {
        let mut tx = cache.begin();
        let current = tx
            .get(key)
            .unwrap()
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        tx.put(key, current + 1).unwrap();
        match tx.commit() {
            Ok(()) => return,
            Err(e) if e.is_conflict() => {
                conflicts.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => panic!("unexpected commit failure: {e}"),
        }
    }
}

#[test]
fn test_rmw_with_retry_loses_no_updates() {
    let cache = TestCache::new();
    cache.put("counter", 0i64).unwrap();
    let conflicts = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    increment_with_retry(&cache, "counter", &conflicts);
                }
            });
        }
    });

    assert_eq!(
        cache.get("counter").unwrap(),
        Some(Value::Int((THREADS * ROUNDS) as i64))
    );
    assert_eq!(
        cache.metrics().transactions_aborted,
        conflicts.load(Ordering::Relaxed) as u64
    );
}

#[test]
fn test_rmw_on_disjoint_keys_never_conflicts() {
    let cache = TestCache::new();
    let conflicts = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let (cache, conflicts) = (&cache, &conflicts);
            s.spawn(move || {
                let key = format!("counter-{t}");
                for _ in 0..ROUNDS {
                    increment_with_retry(cache, &key, conflicts);
                }
            });
        }
    });

    assert_eq!(conflicts.load(Ordering::Relaxed), 0);
    for t in 0..THREADS {
        assert_eq!(
            cache.get(format!("counter-{t}")).unwrap(),
            Some(Value::Int(ROUNDS as i64))
        );
    }
}

#[test]
fn test_versions_strictly_increase_under_contention() {
    let cache = TestCache::new();
    cache.put("k", 0i64).unwrap();
    let conflicts = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..20 {
                    increment_with_retry(&cache, "k", &conflicts);
                }
            });
        }
    });

    // one version per committed write, starting from the seed put
    assert_eq!(cache.version_of("k"), Some(EntryVersion::Numeric(81)));
}
