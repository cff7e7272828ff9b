//! Test opening a file with incompatible layouts.

use crate::btree::{BTree, BTreeError, LayoutError};
use crate::config::{StoreConfig, TreeConfig};
use crate::e2e_tests::helpers::*;
use crate::store::{MemoryBlockStore, MmapBlockStore};

fn create_tree_file(path: &std::path::Path) {
    let mut tree = open_file_tree(path, &StoreConfig::default(), &TreeConfig::with_fan_out(3));
    insert_all(&mut tree, &[1, 2, 3, 4]);
    tree.sync().expect("sync");
}

#[test]
fn test_fan_out_mismatch() {
    let (_dir, path) = temp_store_path();
    create_tree_file(&path);

    let store = MmapBlockStore::open(&path).expect("open store");
    let result = BTree::<_, u64, u64>::open_with(store, &TreeConfig::with_fan_out(5));
    assert!(matches!(
        result,
        Err(BTreeError::Layout(LayoutError::Mismatch {
            field: "fan-out",
            stored: 3,
            expected: 5
        }))
    ));
}

#[test]
fn test_record_size_mismatch() {
    let (_dir, path) = temp_store_path();
    create_tree_file(&path);

    let store = MmapBlockStore::open(&path).expect("open store");
    let result = BTree::<_, u64, [u8; 16]>::open(store);
    assert!(matches!(
        result,
        Err(BTreeError::Layout(LayoutError::Mismatch {
            field: "record size",
            stored: 8,
            expected: 16
        }))
    ));
}

#[test]
fn test_fan_out_out_of_range() {
    let result =
        BTree::<_, u64, u64>::open_with(MemoryBlockStore::new(), &TreeConfig::with_fan_out(2));
    assert!(matches!(
        result,
        Err(BTreeError::Layout(LayoutError::FanOutTooSmall { .. }))
    ));

    let result =
        BTree::<_, u64, u64>::open_with(MemoryBlockStore::new(), &TreeConfig::with_fan_out(5_000));
    assert!(matches!(
        result,
        Err(BTreeError::Layout(LayoutError::FanOutTooLarge {
            maximum: 2729,
            ..
        }))
    ));
}

#[test]
fn test_entries_too_large_for_a_block() {
    let result = BTree::<_, [u8; 32_000], ()>::open(MemoryBlockStore::new());
    assert!(matches!(
        result,
        Err(BTreeError::Layout(LayoutError::EntryTooLarge { .. }))
    ));
}
