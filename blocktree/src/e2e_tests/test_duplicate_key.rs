//! Test that inserting a present key fails and changes nothing.

use crate::btree::BTreeError;
use crate::e2e_tests::helpers::*;
use crate::store::BlockStore;

#[test]
fn test_duplicate_key_keeps_first_record() {
    let mut tree = memory_tree(3);
    insert_all(&mut tree, &[5, 1, 9]);

    let err = tree.insert(5, 0).expect_err("duplicate");
    assert!(matches!(err, BTreeError::DuplicateKey { ref key } if key == "5"));
    assert!(err.is_recoverable());
    assert_eq!(tree.find(&5).expect("find"), Some(record_for(5)));
}

#[test]
fn test_duplicate_in_full_node_does_not_split() {
    let mut tree = memory_tree(3);
    insert_all(&mut tree, &[1, 2, 3]);
    let before = tree.dump().expect("dump");

    tree.insert(2, 0).expect_err("duplicate");

    assert_eq!(tree.dump().expect("dump"), before);
    assert_eq!(tree.store().block_count(), 2, "no block was allocated");
}

#[test]
fn test_duplicate_of_promoted_key() {
    let mut tree = memory_tree(3);
    let keys: Vec<u64> = (1..=20).collect();
    insert_all(&mut tree, &keys);

    for &key in &keys {
        let err = tree.insert(key, 0).expect_err("duplicate");
        assert!(err.is_recoverable());
    }
    assert_all_found(&mut tree, &keys);
    tree.validate().expect("valid");
}
