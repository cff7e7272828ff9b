//! Disk-resident B-tree.
//!
//! Keys and records have fixed encoded sizes ([`FixedSize`]), which fixes
//! the number of entries per node. Nodes live one per block and refer to
//! each other by block index only.

mod codec;
mod engine;
mod layout;
mod node;
mod tree;

pub use codec::FixedSize;
pub use engine::TreeStats;
pub use layout::{
    CHILD_REF_SIZE, LayoutError, MIN_FAN_OUT, NODE_HEADER_SIZE, NodeLayout, entry_size,
    max_entries, max_fan_out, node_size,
};
pub use node::{NODE_TAG, NodeError, NodeHeader};
pub use tree::{BTree, BTreeError, ROOT_SLOT};
