//! In-memory block store.
//!
//! Same contract as the file-backed store, without durability. An optional
//! block limit makes allocation failures reproducible in tests.

use tracing::trace;

use crate::store::{BLOCK_SIZE, BlockIndex, BlockStore, StoreError, check_index};

/// A block store that keeps every block on the heap.
#[derive(Debug)]
pub struct MemoryBlockStore {
    /// Index 0 is the (unused) header block.
    blocks: Vec<Box<[u8]>>,
    max_blocks: Option<BlockIndex>,
}

impl MemoryBlockStore {
    /// Create an empty store holding only the header block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: vec![zeroed_block()],
            max_blocks: None,
        }
    }

    /// Create an empty store that refuses to hold more than `max_blocks`
    /// blocks, header included.
    #[must_use]
    pub fn with_max_blocks(max_blocks: BlockIndex) -> Self {
        Self {
            blocks: vec![zeroed_block()],
            max_blocks: Some(max_blocks),
        }
    }

    /// Change the block limit of an existing store.
    pub const fn set_max_blocks(&mut self, max_blocks: Option<BlockIndex>) {
        self.max_blocks = max_blocks;
    }

    /// Convert a checked block index into a vector position.
    #[allow(clippy::cast_possible_truncation)] // indices are bounded by blocks.len()
    const fn position(index: BlockIndex) -> usize {
        index as usize
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn allocate_block(&mut self) -> Result<(BlockIndex, &mut [u8]), StoreError> {
        let index = self.block_count();
        if let Some(max_blocks) = self.max_blocks
            && index >= max_blocks
        {
            return Err(StoreError::StorageExhausted {
                block_count: index,
                max_blocks,
            });
        }

        self.blocks.push(zeroed_block());
        trace!(index, "allocated block");

        let block = &mut self.blocks[Self::position(index)];
        Ok((index, &mut block[..]))
    }

    fn block(&mut self, index: BlockIndex) -> Result<&[u8], StoreError> {
        check_index(index, self.block_count())?;
        Ok(&self.blocks[Self::position(index)][..])
    }

    fn block_mut(&mut self, index: BlockIndex) -> Result<&mut [u8], StoreError> {
        check_index(index, self.block_count())?;
        Ok(&mut self.blocks[Self::position(index)][..])
    }

    fn block_count(&self) -> BlockIndex {
        self.blocks.len() as BlockIndex
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn zeroed_block() -> Box<[u8]> {
    vec![0u8; BLOCK_SIZE].into_boxed_slice()
}
