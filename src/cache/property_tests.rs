//! Property-Based Tests for the Cache Engine
//!
//! Uses proptest to verify engine correctness against a simple in-memory
//! model, exercising the synchronous engine directly (the worker adds
//! ordering, not semantics).

use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;

use crate::cache::CacheEngine;
use crate::config::Config;

// == Test Configuration ==
/// Large enough that the model-consistency properties never evict.
const UNBOUNDED_BUDGET: u64 = 1024 * 1024;
const SMALL_BUDGET: u64 = 256;

// == Strategies ==
/// Generates cache keys from a small pool so operations collide often.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}".prop_map(|s| s)
}

/// Generates binary payloads, including empty ones.
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..128)
}

/// A sequence of cache operations for model-based testing.
#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, payload: Vec<u8> },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), payload_strategy())
            .prop_map(|(key, payload)| CacheOp::Put { key, payload }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn engine(dir: &tempfile::TempDir, budget: u64) -> CacheEngine {
    let config = Config::new("prop", budget).root_dir(dir.path());
    let mut engine = CacheEngine::open(&config).unwrap();
    engine.recover();
    engine
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // For any operation sequence without eviction pressure, the engine
    // agrees with a HashMap model: gets see exactly the last put that was
    // not deleted, and the running total equals the model's byte sum.
    #[test]
    fn prop_model_consistency(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir, UNBOUNDED_BUDGET);
        let mut model: HashMap<String, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Put { key, payload } => {
                    engine.put(&key, &mut Cursor::new(payload.clone())).unwrap();
                    model.insert(key, payload);
                }
                CacheOp::Get { key } => {
                    match engine.get_as_file(&key) {
                        Some(path) => {
                            let expected = model.get(&key);
                            prop_assert!(expected.is_some(), "engine hit for absent key");
                            prop_assert_eq!(&fs::read(path).unwrap(), expected.unwrap());
                        }
                        None => prop_assert!(
                            !model.contains_key(&key),
                            "engine miss for present key"
                        ),
                    }
                }
                CacheOp::Delete { key } => {
                    engine.delete(&key);
                    model.remove(&key);
                }
            }
        }

        let model_bytes: u64 = model.values().map(|v| v.len() as u64).sum();
        prop_assert_eq!(engine.total_bytes(), model_bytes, "running total mismatch");
    }

    // Round-trip: put then get yields the exact bytes stored.
    #[test]
    fn prop_roundtrip(key in key_strategy(), payload in payload_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir, UNBOUNDED_BUDGET);

        engine.put(&key, &mut Cursor::new(payload.clone())).unwrap();
        let path = engine.get_as_file(&key).unwrap();
        prop_assert_eq!(fs::read(path).unwrap(), payload);
    }

    // Overwrite: the second payload wins and accounting reflects only it.
    #[test]
    fn prop_overwrite(
        key in key_strategy(),
        first in payload_strategy(),
        second in payload_strategy(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir, UNBOUNDED_BUDGET);

        engine.put(&key, &mut Cursor::new(first)).unwrap();
        engine.put(&key, &mut Cursor::new(second.clone())).unwrap();

        let path = engine.get_as_file(&key).unwrap();
        prop_assert_eq!(fs::read(path).unwrap(), second.clone());
        prop_assert_eq!(engine.total_bytes(), second.len() as u64);
    }

    // Size bound: after any put returns, the running total of finalized
    // entries is back within budget (eviction runs before the put ends).
    #[test]
    fn prop_budget_respected(ops in prop::collection::vec(
        (key_strategy(), payload_strategy()), 1..30)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir, SMALL_BUDGET);

        for (key, payload) in ops {
            engine.put(&key, &mut Cursor::new(payload)).unwrap();
            prop_assert!(
                engine.total_bytes() <= SMALL_BUDGET,
                "total {} exceeds budget {}",
                engine.total_bytes(),
                SMALL_BUDGET
            );
        }
    }

    // Statistics: hits and misses track get outcomes exactly.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(&dir, UNBOUNDED_BUDGET);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Put { key, payload } => {
                    engine.put(&key, &mut Cursor::new(payload)).unwrap();
                }
                CacheOp::Get { key } => match engine.get_as_file(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Delete { key } => engine.delete(&key),
            }
        }

        let stats = engine.stats();
        prop_assert_eq!(stats.hits, expected_hits, "hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "misses mismatch");
    }
}
