//! Expiration Tests
//!
//! Lifespan and max-idle behavior observed through the facade, with the
//! clock driven by `ControlledTimeService`.

use crate::common::*;
use strata_cache::prelude::*;
use strata_cache::strata_cache_storage::EntryKind;

fn lifespan(ms: i64) -> Metadata {
    Metadata::builder().lifespan(ms).build()
}

fn max_idle(ms: i64) -> Metadata {
    Metadata::builder().max_idle(ms).build()
}

// =============================================================================
// VARIANT SELECTION
// =============================================================================

#[test]
fn test_variant_follows_expiration_bounds() {
    let cache = TestCache::new();

    cache.put("immortal", 1i64).unwrap();
    cache.put_with_metadata("mortal", 1i64, lifespan(1000)).unwrap();
    cache.put_with_metadata("transient", 1i64, max_idle(500)).unwrap();
    cache
        .put_with_metadata(
            "both",
            1i64,
            Metadata::builder().lifespan(1000).max_idle(500).build(),
        )
        .unwrap();

    assert_eq!(cache.peek_entry("immortal").unwrap().kind(), EntryKind::Immortal);
    assert_eq!(cache.peek_entry("mortal").unwrap().kind(), EntryKind::Mortal);
    assert_eq!(cache.peek_entry("transient").unwrap().kind(), EntryKind::Transient);
    assert_eq!(cache.peek_entry("both").unwrap().kind(), EntryKind::TransientMortal);
}

#[test]
fn test_overwrite_reselects_variant() {
    let cache = TestCache::new();

    cache.put_with_metadata("k", 1i64, lifespan(1000)).unwrap();
    cache.put("k", 2i64).unwrap();
    assert_eq!(cache.peek_entry("k").unwrap().kind(), EntryKind::Immortal);
}

#[test]
fn test_default_metadata_applies_to_plain_puts() {
    let cache = TestCache::with(|b| b.default_metadata(Metadata::builder().lifespan(100).build()));

    cache.put("k", 1i64).unwrap();
    assert_eq!(cache.peek_entry("k").unwrap().kind(), EntryKind::Mortal);
    cache.advance(101);
    assert!(cache.get("k").unwrap().is_none());
}

// =============================================================================
// LIFESPAN
// =============================================================================

#[test]
fn test_lifespan_boundary() {
    let cache = TestCache::new();
    cache.put_with_metadata("k", 1i64, lifespan(1000)).unwrap();

    let entry = cache.peek_entry("k").unwrap();
    assert!(!entry.is_expired(T0 + 999));
    assert!(!entry.is_expired(T0 + 1000));
    assert!(entry.is_expired(T0 + 1001));
}

#[test]
fn test_expired_read_is_a_miss_not_an_error() {
    let cache = TestCache::new();
    cache.put_with_metadata("k", 1i64, lifespan(1000)).unwrap();

    cache.advance(999);
    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(1)));

    cache.advance(2);
    assert_eq!(cache.get("k").unwrap(), None);
    assert!(cache.peek_entry("k").is_none());
    assert_eq!(cache.metrics().expirations, 1);
}

#[test]
fn test_purge_expired() {
    let cache = TestCache::new();
    for i in 0..5i64 {
        cache.put_with_metadata(format!("short{}", i), i, lifespan(10)).unwrap();
    }
    cache.put("forever", 1i64).unwrap();

    cache.advance(11);
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.purge_expired(), 5);
    assert_eq!(cache.metrics().entries, 1);
}

// =============================================================================
// MAX IDLE
// =============================================================================

#[test]
fn test_reads_extend_max_idle() {
    let cache = TestCache::new();
    cache.put_with_metadata("k", 1i64, max_idle(500)).unwrap();

    cache.advance(100);
    assert_eq!(cache.get("k").unwrap(), Some(Value::Int(1)));

    // idle deadline is now T0+100+500
    let entry = cache.peek_entry("k").unwrap();
    assert!(!entry.is_expired(T0 + 550));
    assert!(entry.is_expired(T0 + 650));
}

#[test]
fn test_idle_entry_expires_without_reads() {
    let cache = TestCache::new();
    cache.put_with_metadata("k", 1i64, max_idle(500)).unwrap();

    cache.advance(501);
    assert!(cache.get("k").unwrap().is_none());
}

#[test]
fn test_lifespan_caps_max_idle() {
    let cache = TestCache::new();
    cache
        .put_with_metadata("k", 1i64, Metadata::builder().lifespan(300).max_idle(200).build())
        .unwrap();

    for _ in 0..3 {
        cache.advance(100);
        assert_eq!(cache.get("k").unwrap(), Some(Value::Int(1)));
    }
    // reads kept it idle-fresh, but the lifespan has run out
    cache.advance(1);
    assert!(cache.get("k").unwrap().is_none());
}

// =============================================================================
// EXPIRY AND TRANSACTIONS
// =============================================================================

#[test]
fn test_write_over_expired_entry_creates_fresh_entry() {
    let cache = TestCache::new();
    cache.put_with_metadata("k", 1i64, lifespan(10)).unwrap();
    cache.advance(20);

    let mut tx = cache.begin();
    assert!(tx.get("k").unwrap().is_none());
    tx.put("k", 2i64).unwrap();
    tx.commit().unwrap();

    let entry = cache.peek_entry("k").unwrap();
    assert_eq!(entry.value(), Some(&Value::Int(2)));
    assert_eq!(entry.kind(), EntryKind::Immortal);
}

#[test]
fn test_delta_committed_after_expiry_lands_on_fresh_entry() {
    let cache = TestCache::new();
    cache.put_with_metadata("n", 10i64, lifespan(100)).unwrap();

    let mut tx = cache.begin();
    tx.append_delta("n", Delta::Add(5)).unwrap();
    assert_eq!(tx.get("n").unwrap(), Some(Value::Int(15)));

    cache.advance(200);
    tx.commit().unwrap();

    // the expired 10 is not merged into
    assert_eq!(cache.get("n").unwrap(), Some(Value::Int(5)));
    assert_eq!(cache.peek_entry("n").unwrap().kind(), EntryKind::Immortal);
}
