//! Test parent and child references agree in every block.

use crate::btree::NodeHeader;
use crate::e2e_tests::helpers::*;
use crate::store::BlockStore;

#[test]
fn test_every_block_reaches_the_root() {
    let mut tree = memory_tree(4);
    let keys: Vec<u64> = (0..400).map(|i| (i * 7_919) % 1_009).collect();
    insert_all(&mut tree, &keys);
    tree.validate().expect("valid");

    let root = tree.root();
    let mut store = tree.into_store();
    let count = store.block_count();

    let mut headers = Vec::new();
    for index in 1..count {
        let header = NodeHeader::read(store.block(index).expect("block")).expect("node header");
        assert_eq!(header.self_ref, index);
        headers.push(header);
    }

    let roots: Vec<_> = headers.iter().filter(|h| h.parent.is_none()).collect();
    assert_eq!(roots.len(), 1, "exactly one parentless node");
    assert_eq!(roots[0].self_ref, root);

    for header in &headers {
        let mut current = header.self_ref;
        let mut hops = 0;
        while let Some(parent) = headers[usize::try_from(current - 1).expect("index")].parent {
            current = parent;
            hops += 1;
            assert!(hops < count, "parent cycle from block {}", header.self_ref);
        }
        assert_eq!(current, root);
    }
}

#[test]
fn test_rightmost_children_point_back() {
    let mut tree = memory_tree(3);
    insert_all(&mut tree, &(0..100).collect::<Vec<_>>());

    let mut store = tree.into_store();
    for index in 1..store.block_count() {
        let header = NodeHeader::read(store.block(index).expect("block")).expect("node header");
        if let Some(child) = header.rightmost {
            let child_header =
                NodeHeader::read(store.block(child).expect("block")).expect("node header");
            assert_eq!(child_header.parent, Some(index), "child {child}");
        }
    }
}
