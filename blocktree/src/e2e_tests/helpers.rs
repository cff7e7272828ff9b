//! Common helpers for end-to-end tests.

use std::path::Path;

use crate::btree::BTree;
use crate::config::{StoreConfig, TreeConfig};
use crate::store::{BlockStore, MmapBlockStore};

pub use crate::testing::{init_tracing, memory_tree, temp_store_path};

pub type FileTree = BTree<MmapBlockStore, u64, u64>;

/// Open (or create) a file-backed tree.
#[allow(clippy::expect_used)]
pub fn open_file_tree(path: &Path, store: &StoreConfig, tree: &TreeConfig) -> FileTree {
    let store = MmapBlockStore::open_with(path, store).expect("Failed to open store");
    BTree::open_with(store, tree).expect("Failed to open tree")
}

/// The record every helper-driven insert stores for `key`.
pub const fn record_for(key: u64) -> u64 {
    key.wrapping_mul(31).wrapping_add(7)
}

/// Insert each key with its `record_for` record.
#[allow(clippy::expect_used)]
pub fn insert_all<S: BlockStore>(tree: &mut BTree<S, u64, u64>, keys: &[u64]) {
    for &key in keys {
        tree.insert(key, record_for(key)).expect("insert");
    }
}

/// Assert every key is found with its `record_for` record.
#[allow(clippy::expect_used)]
pub fn assert_all_found<S: BlockStore>(tree: &mut BTree<S, u64, u64>, keys: &[u64]) {
    for &key in keys {
        assert_eq!(
            tree.find(&key).expect("find"),
            Some(record_for(key)),
            "key {key}"
        );
    }
}
