//! A disk-backed B-tree over a memory-mapped block store.
//!
//! The store hands out fixed-size blocks by index; the tree keeps one node
//! per block and links nodes by block index, so a tree written by one
//! process is reopened by the next from the same file.
//!
//! ```no_run
//! use blocktree::{BTree, MmapBlockStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MmapBlockStore::open(std::path::Path::new("index.bt"))?;
//! let mut tree: BTree<_, u64, u64> = BTree::open(store)?;
//! tree.insert(42, 7)?;
//! assert_eq!(tree.find(&42)?, Some(7));
//! tree.sync()?;
//! # Ok(())
//! # }
//! ```

pub mod btree;
mod bytes;
pub mod config;
pub mod store;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;

pub use btree::{BTree, BTreeError, FixedSize, TreeStats};
pub use config::{ConfigError, StoreConfig, TreeConfig};
pub use store::{BLOCK_SIZE, BlockIndex, BlockStore, MemoryBlockStore, MmapBlockStore, StoreError};
