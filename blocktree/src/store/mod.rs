//! Block storage for the B-tree.
//!
//! A block store hands out fixed-size blocks addressed by index. The tree
//! never holds on to a block's memory across calls: every access goes
//! through [`BlockStore::block`] or [`BlockStore::block_mut`], and the
//! borrow ends with the call that produced it.
//!
//! # File Format
//!
//! - Block 0: header (magic, format version, block size, block count)
//! - Blocks 1-N: B-tree nodes, one node per block
//!
//! Index 0 doubles as the "no block" sentinel in node references, so it is
//! never handed out by [`BlockStore::allocate_block`] and cannot be
//! resolved through [`BlockStore::block`].

mod header;
mod memory;
mod mmap;

pub use header::{FORMAT_VERSION, HeaderError, MAGIC, StoreHeader};
pub use memory::MemoryBlockStore;
pub use mmap::MmapBlockStore;

/// Block size in bytes (64KB).
///
/// Also fixes the fan-out of the tree, since one node occupies one block.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Block size as u64 for offset calculations.
pub const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;

/// A block identifier (0-indexed block number).
pub type BlockIndex = u64;

/// The header block, and the "no block" sentinel in node references.
pub const NULL_BLOCK: BlockIndex = 0;

/// Durable storage of fixed-size blocks.
pub trait BlockStore {
    /// Allocate a new zero-filled block at the end of the store.
    ///
    /// Indices are assigned sequentially; the first allocation in a fresh
    /// store returns 1.
    fn allocate_block(&mut self) -> Result<(BlockIndex, &mut [u8]), StoreError>;

    /// Resolve a block index for reading.
    fn block(&mut self, index: BlockIndex) -> Result<&[u8], StoreError>;

    /// Resolve a block index for writing.
    fn block_mut(&mut self, index: BlockIndex) -> Result<&mut [u8], StoreError>;

    /// Number of allocated blocks, including the header block.
    fn block_count(&self) -> BlockIndex;

    /// Flush all written blocks to durable storage.
    fn sync(&mut self) -> Result<(), StoreError>;
}

/// Errors that can occur during block store operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error (file growth, mapping, flushing).
    Io(std::io::Error),
    /// Block index is the header block or past the allocated range.
    InvalidBlockReference {
        index: BlockIndex,
        block_count: BlockIndex,
    },
    /// The store refused to grow past its configured limit.
    StorageExhausted {
        block_count: BlockIndex,
        max_blocks: BlockIndex,
    },
    /// Header block is missing or invalid.
    Header(HeaderError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidBlockReference { index, block_count } => write!(
                f,
                "invalid block reference {index} (allocated blocks: {block_count})"
            ),
            Self::StorageExhausted {
                block_count,
                max_blocks,
            } => write!(
                f,
                "storage exhausted: {block_count} of {max_blocks} blocks allocated"
            ),
            Self::Header(e) => write!(f, "header error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Header(e) => Some(e),
            Self::InvalidBlockReference { .. } | Self::StorageExhausted { .. } => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<HeaderError> for StoreError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}

/// Reject the header block and anything past the allocated range.
pub(crate) const fn check_index(
    index: BlockIndex,
    block_count: BlockIndex,
) -> Result<(), StoreError> {
    if index == NULL_BLOCK || index >= block_count {
        return Err(StoreError::InvalidBlockReference { index, block_count });
    }
    Ok(())
}
