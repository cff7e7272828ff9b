//! Test how depth grows with the number of keys.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::e2e_tests::helpers::*;

#[test]
fn test_depth_is_one_up_to_fan_out() {
    for fan_out in [3, 4, 10] {
        let mut tree = memory_tree(fan_out);
        for key in 0..fan_out as u64 {
            tree.insert(key, record_for(key)).expect("insert");
            assert_eq!(tree.depth().expect("depth"), 1);
        }

        tree.insert(fan_out as u64, 0).expect("insert");
        assert_eq!(tree.depth().expect("depth"), 2);
    }
}

#[test]
fn test_depth_never_decreases() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut keys: Vec<u64> = (0..500).collect();
    keys.shuffle(&mut rng);

    let mut tree = memory_tree(3);
    let mut last = tree.depth().expect("depth");
    for &key in &keys {
        tree.insert(key, record_for(key)).expect("insert");
        let depth = tree.depth().expect("depth");
        assert!(depth >= last, "depth dropped from {last} to {depth}");
        assert!(depth <= last + 1, "depth grew by more than one level");
        last = depth;
    }

    assert_eq!(tree.stats().expect("stats").depth, last);
}
