//! Test inserts in shuffled order against a reference map.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;

#[test]
fn test_shuffled_inserts_stay_valid() {
    init_tracing();

    for (seed, fan_out) in [(1, 3), (2, 4), (3, 7), (4, 64)] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut keys: Vec<u64> = (0..1_000).collect();
        keys.shuffle(&mut rng);

        let mut tree = memory_tree(fan_out);
        for (i, &key) in keys.iter().enumerate() {
            tree.insert(key, record_for(key)).expect("insert");
            if i % 100 == 0 {
                tree.validate().expect("valid mid-run");
            }
        }

        tree.validate().expect("valid");
        assert_all_found(&mut tree, &keys);
        assert_eq!(tree.find(&1_000).expect("find"), None);
        assert_eq!(tree.stats().expect("stats").entries, 1_000);
    }
}

#[test]
fn test_sparse_random_keys_match_reference() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut tree = memory_tree(5);
    let mut reference = BTreeMap::new();

    for _ in 0..2_000 {
        let key = rng.random_range(0..5_000u64);
        let record = rng.random::<u64>();
        let inserted = tree.insert(key, record);

        if reference.contains_key(&key) {
            assert!(inserted.is_err(), "key {key} inserted twice");
        } else {
            inserted.expect("insert");
            reference.insert(key, record);
        }
    }

    tree.validate().expect("valid");
    for key in 0..5_000u64 {
        assert_eq!(
            tree.find(&key).expect("find"),
            reference.get(&key).copied(),
            "key {key}"
        );
    }
}

#[test]
fn test_descending_inserts() {
    let mut tree = memory_tree(3);
    let keys: Vec<u64> = (0..300).rev().collect();

    insert_all(&mut tree, &keys);

    tree.validate().expect("valid");
    assert_all_found(&mut tree, &keys);
}
