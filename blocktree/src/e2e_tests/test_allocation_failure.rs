//! Test inserts that run out of blocks part way through.

use crate::btree::{BTree, BTreeError};
use crate::config::{StoreConfig, TreeConfig};
use crate::e2e_tests::helpers::*;
use crate::store::{BlockStore, MemoryBlockStore, StoreError};

fn is_exhausted(err: &BTreeError) -> bool {
    matches!(err, BTreeError::Store(StoreError::StorageExhausted { .. }))
}

#[test]
fn test_failed_leaf_split_leaves_tree_unchanged() {
    // Root split needs blocks 2 and 3; the next leaf split needs block 4.
    let store = MemoryBlockStore::with_max_blocks(4);
    let mut tree: BTree<_, u64, u64> =
        BTree::open_with(store, &TreeConfig::with_fan_out(3)).expect("open tree");
    insert_all(&mut tree, &[1, 2, 3, 4, 5, 6]);
    let before = tree.dump().expect("dump");

    let err = tree.insert(7, 0).expect_err("out of blocks");
    assert!(is_exhausted(&err), "{err}");
    assert!(!err.is_recoverable());

    assert_eq!(tree.dump().expect("dump"), before);
    tree.validate().expect("valid");
    assert_all_found(&mut tree, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(tree.find(&7).expect("find"), None);
}

#[test]
fn test_failed_root_split_leaks_only_the_new_root() {
    let store = MemoryBlockStore::with_max_blocks(3);
    let mut tree: BTree<_, u64, u64> =
        BTree::open_with(store, &TreeConfig::with_fan_out(3)).expect("open tree");
    insert_all(&mut tree, &[1, 2, 3]);

    let err = tree.insert(4, 0).expect_err("out of blocks");
    assert!(is_exhausted(&err), "{err}");

    assert_eq!(tree.root(), 1);
    tree.validate().expect("valid");
    assert_all_found(&mut tree, &[1, 2, 3]);
    assert_eq!(tree.stats().expect("stats").nodes, 1);
    assert_eq!(tree.store().block_count(), 3, "unused root block stays allocated");
}

#[test]
fn test_root_refreshed_after_partial_split() {
    init_tracing();
    let (_dir, path) = temp_store_path();
    let keys: Vec<u64> = (1..=12).collect();

    // Ascending inserts into a fan-out 3 tree leave a full root over a full
    // rightmost leaf in blocks 1..=5.
    {
        let mut tree = open_file_tree(&path, &StoreConfig::default(), &TreeConfig::with_fan_out(3));
        insert_all(&mut tree, &keys);
        assert_eq!(tree.store().block_count(), 6);
        tree.sync().expect("sync");
    }

    // Room for the root split (blocks 6 and 7) but not the leaf split.
    let limited = StoreConfig {
        max_blocks: Some(8),
        ..StoreConfig::default()
    };
    let mut tree = open_file_tree(&path, &limited, &TreeConfig::default());
    let old_root = tree.root();

    let err = tree.insert(13, 0).expect_err("out of blocks");
    assert!(is_exhausted(&err), "{err}");

    assert_ne!(tree.root(), old_root, "completed root split is kept");
    assert_eq!(tree.depth().expect("depth"), 3);
    tree.validate().expect("valid");
    assert_all_found(&mut tree, &keys);
    assert_eq!(tree.find(&13).expect("find"), None);
}
