//! Delta Tests
//!
//! Queued deltas fold over the value of record at commit, so independent
//! partial updates to one key compose.

use crate::common::*;
use strata_cache::prelude::*;

fn adds() -> Vec<Delta> {
    vec![Delta::Add(3), Delta::Add(-1), Delta::Add(10)]
}

// =============================================================================
// CONFLUENCE
// =============================================================================

#[test]
fn test_deltas_on_absent_key_match_eager_merge() {
    let lazy = TestCache::new();
    let mut tx = lazy.begin();
    for d in adds() {
        tx.append_delta("n", d).unwrap();
    }
    tx.commit().unwrap();

    let eager = TestCache::new();
    let mut value: Option<Value> = None;
    for d in adds() {
        value = Some(d.merge(value).unwrap());
    }
    let mut tx = eager.begin();
    tx.put("n", value.clone().unwrap()).unwrap();
    tx.commit().unwrap();

    assert_eq!(lazy.get("n").unwrap(), value);
    assert_eq!(eager.get("n").unwrap(), value);
}

#[test]
fn test_delta_reads_see_local_merge() {
    let cache = TestCache::new();
    cache.put("n", 100i64).unwrap();

    let mut tx = cache.begin();
    tx.append_delta("n", Delta::Add(5)).unwrap();
    assert_eq!(tx.get("n").unwrap(), Some(Value::Int(105)));
}

#[test]
fn test_interleaved_delta_transactions_compose() {
    let cache = TestCache::new();
    cache.put("n", 0i64).unwrap();

    let mut t1 = cache.begin();
    let mut t2 = cache.begin();
    t1.append_delta("n", Delta::Add(1)).unwrap();
    t2.append_delta("n", Delta::Add(10)).unwrap();
    t2.commit().unwrap();
    t1.commit().unwrap();

    assert_eq!(cache.get("n").unwrap(), Some(Value::Int(11)));
}

#[test]
fn test_field_and_list_deltas() {
    let cache = TestCache::new();

    cache
        .apply_delta(
            "profile",
            Delta::PutField {
                field: "name".into(),
                value: Value::from("Alice"),
            },
        )
        .unwrap();
    cache.apply_delta("log", Delta::Append(Value::Int(1))).unwrap();
    cache.apply_delta("log", Delta::Append(Value::Int(2))).unwrap();

    let profile = cache.get("profile").unwrap().unwrap();
    assert_eq!(
        profile.as_object().and_then(|o| o.get("name")),
        Some(&Value::from("Alice"))
    );
    assert_eq!(
        cache.get("log").unwrap(),
        Some(Value::Array(vec![Value::Int(1), Value::Int(2)]))
    );
}

#[test]
fn test_delta_keeps_expiration_of_stored_entry() {
    let cache = TestCache::new();
    cache
        .put_with_metadata("n", 1i64, Metadata::builder().lifespan(1000).build())
        .unwrap();

    cache.apply_delta("n", Delta::Add(1)).unwrap();
    let entry = cache.peek_entry("n").unwrap();
    assert_eq!(entry.value(), Some(&Value::Int(2)));
    assert_eq!(entry.lifespan(), 1000);
}

// =============================================================================
// ROLLBACK AND ERRORS
// =============================================================================

#[test]
fn test_rollback_restores_pre_transaction_value() {
    let cache = TestCache::new();
    cache.put("n", 42i64).unwrap();

    let mut tx = cache.begin();
    for d in adds() {
        tx.append_delta("n", d).unwrap();
    }
    tx.rollback();

    assert_eq!(cache.get("n").unwrap(), Some(Value::Int(42)));
}

#[test]
fn test_delta_on_wrong_type_is_rejected() {
    let cache = TestCache::new();
    cache.put("n", "text").unwrap();

    let mut tx = cache.begin();
    let err = tx.append_delta("n", Delta::Add(1)).unwrap_err();
    assert!(matches!(err, Error::WrongType { .. }));
}

#[test]
fn test_store_type_change_aborts_whole_transaction() {
    let cache = TestCache::new();
    cache.put("n", 1i64).unwrap();

    let mut tx = cache.begin();
    tx.put("other", 1i64).unwrap();
    tx.append_delta("n", Delta::Add(1)).unwrap();
    cache.put("n", "now text").unwrap();

    assert!(matches!(tx.commit().unwrap_err(), Error::WrongType { .. }));
    assert!(cache.get("other").unwrap().is_none());
}

#[test]
fn test_put_then_delta_in_one_transaction() {
    let cache = TestCache::new();
    cache.put("n", 1000i64).unwrap();

    let mut tx = cache.begin();
    tx.put("n", 10i64).unwrap();
    tx.append_delta("n", Delta::Add(2)).unwrap();
    tx.commit().unwrap();

    assert_eq!(cache.get("n").unwrap(), Some(Value::Int(12)));
}

// =============================================================================
// PROPERTIES
// =============================================================================

mod properties {
    use crate::common::*;
    use proptest::prelude::*;
    use strata_cache::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn split_delta_batches_sum_like_one_put(
            batches in proptest::collection::vec(
                proptest::collection::vec(-1000i64..1000, 1..5),
                1..6,
            )
        ) {
            let cache = TestCache::new();
            for batch in &batches {
                let mut tx = cache.begin();
                for n in batch {
                    tx.append_delta("n", Delta::Add(*n)).unwrap();
                }
                tx.commit().unwrap();
            }

            let total: i64 = batches.iter().flatten().sum();
            prop_assert_eq!(cache.get("n").unwrap(), Some(Value::Int(total)));
        }

        #[test]
        fn rolled_back_deltas_leave_no_trace(
            seed in -1000i64..1000,
            adds in proptest::collection::vec(-1000i64..1000, 1..8),
        ) {
            let cache = TestCache::new();
            cache.put("n", seed).unwrap();
            let version = cache.version_of("n");

            let mut tx = cache.begin();
            for n in &adds {
                tx.append_delta("n", Delta::Add(*n)).unwrap();
            }
            tx.rollback();

            prop_assert_eq!(cache.get("n").unwrap(), Some(Value::Int(seed)));
            prop_assert_eq!(cache.version_of("n"), version);
        }
    }
}
