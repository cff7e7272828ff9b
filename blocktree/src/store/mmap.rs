//! Memory-mapped file block store.
//!
//! Each block gets its own mapping, created the first time the block is
//! referenced and cached for the lifetime of the store. Growing the file
//! never moves an existing mapping, so a block's bytes stay at the same
//! address until the store is dropped.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::store::header::{HeaderError, StoreHeader};
use crate::store::{BLOCK_SIZE, BLOCK_SIZE_U64, BlockIndex, BlockStore, StoreError, check_index};

/// A block store backed by a memory-mapped file.
pub struct MmapBlockStore {
    file: File,
    path: PathBuf,
    config: StoreConfig,
    header: StoreHeader,
    /// Block 0, mapped for the lifetime of the store.
    header_map: MmapMut,
    /// Blocks the file currently has room for (may exceed the allocated count).
    file_blocks: u64,
    mapped: HashMap<BlockIndex, MmapMut>,
}

impl MmapBlockStore {
    /// Open the store at `path` with default configuration, creating it if
    /// the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Open the store at `path`, creating it if the file does not exist or
    /// is empty.
    pub fn open_with(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        if file_len == 0 {
            return Self::create(file, path, config);
        }

        // Never map past the end of the file.
        if file_len % BLOCK_SIZE_U64 != 0 {
            return Err(HeaderError::FileSize(file_len).into());
        }

        let header_map = map_block(&file, 0)?;
        let header = StoreHeader::read_from(&header_map)?;
        header.check_file_len(file_len)?;

        debug!(
            path = %path.display(),
            block_count = header.block_count,
            "opened block store"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            config: config.clone(),
            header,
            header_map,
            file_blocks: file_len / BLOCK_SIZE_U64,
            mapped: HashMap::new(),
        })
    }

    fn create(file: File, path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        file.set_len(BLOCK_SIZE_U64)?;

        let mut header_map = map_block(&file, 0)?;
        let header = StoreHeader::new();
        header.write_to(&mut header_map);
        header_map.flush()?;

        debug!(path = %path.display(), "created block store");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            config: config.clone(),
            header,
            header_map,
            file_blocks: 1,
            mapped: HashMap::new(),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of blocks the backing file has room for.
    #[must_use]
    pub const fn file_blocks(&self) -> u64 {
        self.file_blocks
    }

    /// Number of blocks mapped so far.
    #[must_use]
    pub fn mapped_blocks(&self) -> usize {
        self.mapped.len()
    }

    /// Make sure the file holds at least `needed` blocks.
    fn grow(&mut self, needed: u64) -> Result<(), StoreError> {
        if needed <= self.file_blocks {
            return Ok(());
        }

        let mut target = needed.max(self.file_blocks + self.config.growth_blocks.max(1));
        if let Some(max_blocks) = self.config.max_blocks {
            target = target.min(max_blocks).max(needed);
        }

        self.file.set_len(target * BLOCK_SIZE_U64)?;
        debug!(from = self.file_blocks, to = target, "grew block store file");
        self.file_blocks = target;
        Ok(())
    }

    /// Get the cached mapping for a block, mapping it on first use.
    fn mapping(&mut self, index: BlockIndex) -> Result<&mut MmapMut, StoreError> {
        match self.mapped.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let map = map_block(&self.file, index)?;
                trace!(index, "mapped block");
                Ok(entry.insert(map))
            }
        }
    }
}

impl BlockStore for MmapBlockStore {
    fn allocate_block(&mut self) -> Result<(BlockIndex, &mut [u8]), StoreError> {
        let index = self.header.block_count;
        if let Some(max_blocks) = self.config.max_blocks
            && index >= max_blocks
        {
            return Err(StoreError::StorageExhausted {
                block_count: index,
                max_blocks,
            });
        }

        self.grow(index + 1)?;
        self.mapping(index)?.fill(0);

        // Publish the new count only once the block is usable.
        self.header.block_count = index + 1;
        self.header.write_to(&mut self.header_map);
        trace!(index, "allocated block");

        let map = self.mapping(index)?;
        Ok((index, &mut map[..]))
    }

    fn block(&mut self, index: BlockIndex) -> Result<&[u8], StoreError> {
        check_index(index, self.header.block_count)?;
        Ok(&self.mapping(index)?[..])
    }

    fn block_mut(&mut self, index: BlockIndex) -> Result<&mut [u8], StoreError> {
        check_index(index, self.header.block_count)?;
        Ok(&mut self.mapping(index)?[..])
    }

    fn block_count(&self) -> BlockIndex {
        self.header.block_count
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.header_map.flush()?;
        for map in self.mapped.values() {
            map.flush()?;
        }
        self.file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for MmapBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapBlockStore")
            .field("path", &self.path)
            .field("block_count", &self.header.block_count)
            .field("file_blocks", &self.file_blocks)
            .field("mapped_blocks", &self.mapped.len())
            .finish_non_exhaustive()
    }
}

/// Map a single block of the file for reading and writing.
#[allow(unsafe_code)]
fn map_block(file: &File, index: BlockIndex) -> std::io::Result<MmapMut> {
    // SAFETY: the mapped range lies entirely inside the file (callers grow
    // the file before mapping past its end) and the store never shrinks the
    // file while mappings are alive. The store is the file's only writer.
    unsafe {
        MmapOptions::new()
            .offset(index * BLOCK_SIZE_U64)
            .len(BLOCK_SIZE)
            .map_mut(file)
    }
}
