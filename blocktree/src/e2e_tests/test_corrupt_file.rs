//! Test damaged files are reported instead of misread.

use crate::btree::{BTree, BTreeError, NodeError, NodeHeader};
use crate::bytes::write_u64;
use crate::config::{StoreConfig, TreeConfig};
use crate::e2e_tests::helpers::*;
use crate::store::{BLOCK_SIZE, BlockStore, HeaderError, MmapBlockStore, StoreError};

/// Offset of the parent reference in a node header.
const PARENT_OFFSET: usize = 24;

fn build_file(path: &std::path::Path) -> u64 {
    let mut tree = open_file_tree(path, &StoreConfig::default(), &TreeConfig::with_fan_out(3));
    insert_all(&mut tree, &(0..30).collect::<Vec<_>>());
    tree.sync().expect("sync");
    tree.root()
}

#[test]
fn test_overwritten_node_tag() {
    let (_dir, path) = temp_store_path();
    build_file(&path);

    let mut store = MmapBlockStore::open(&path).expect("open store");
    store.block_mut(1).expect("block 1")[0] = 0xFF;

    let result = BTree::<_, u64, u64>::open(store);
    assert!(matches!(
        result,
        Err(BTreeError::Node(NodeError::InvalidTag(0xFF)))
    ));
}

#[test]
fn test_parent_cycle() {
    let (_dir, path) = temp_store_path();
    let root = build_file(&path);

    let mut store = MmapBlockStore::open(&path).expect("open store");
    let block = store.block_mut(root).expect("root block");
    write_u64(block, PARENT_OFFSET, root);

    let result = BTree::<_, u64, u64>::open(store);
    assert!(matches!(result, Err(BTreeError::Corrupt(_))));
}

#[test]
fn test_validate_reports_damaged_child() {
    init_tracing();
    let (_dir, path) = temp_store_path();
    let root = build_file(&path);

    let mut tree: BTree<_, u64, u64> =
        BTree::open(MmapBlockStore::open(&path).expect("open store")).expect("open tree");
    assert!(tree.depth().expect("depth") >= 3, "leaves sit below the root's children");
    let mut store = tree.into_store();

    // Point a leaf straight at the root, skipping its real parent.
    let count = store.block_count();
    let leaf = (1..count)
        .find(|&i| {
            let header = NodeHeader::read(store.block(i).expect("block")).expect("header");
            header.rightmost.is_none()
        })
        .expect("a leaf");
    write_u64(store.block_mut(leaf).expect("leaf"), PARENT_OFFSET, root);

    let mut tree: BTree<_, u64, u64> = BTree::open(store).expect("reopen tree");
    match tree.validate() {
        Err(BTreeError::InvariantViolation { node, dump, .. }) => {
            assert_eq!(node, leaf);
            assert!(dump.contains(&format!("[NODE {leaf}]")), "{dump}");
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
}

#[test]
fn test_truncated_file() {
    let (_dir, path) = temp_store_path();
    build_file(&path);

    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("open file");
    file.set_len((BLOCK_SIZE + BLOCK_SIZE / 2) as u64)
        .expect("truncate");

    let result = MmapBlockStore::open(&path);
    assert!(matches!(
        result,
        Err(StoreError::Header(HeaderError::FileSize(_)))
    ));
}
