//! Header block structure and serialization.
//!
//! The header occupies block 0 and describes the rest of the file. It is
//! rewritten every time a block is allocated, so the block count it records
//! always covers every block a node can reference.

// BLOCK_SIZE is a compile-time constant that fits in u32.
#![allow(clippy::cast_possible_truncation)]

use crate::bytes::{read_u32, read_u64, write_u32, write_u64};
use crate::store::{BLOCK_SIZE, BLOCK_SIZE_U64, BlockIndex};

/// Magic number identifying a block store file: "BLKTREE\0"
pub const MAGIC: [u8; 8] = *b"BLKTREE\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Block size as u32 for storage in the header.
const BLOCK_SIZE_U32: u32 = BLOCK_SIZE as u32;

/// Header field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const BLOCK_SIZE: usize = 12;
    pub const BLOCK_COUNT: usize = 16;
    pub const CHECKSUM: usize = 24;
}

/// Metadata stored in block 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    /// Format version number.
    pub format_version: u32,
    /// Block size in bytes (should always be `BLOCK_SIZE`).
    pub block_size: u32,
    /// Number of allocated blocks, including this one.
    pub block_count: BlockIndex,
}

impl StoreHeader {
    /// Create a header for a fresh store holding only the header block.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            block_size: BLOCK_SIZE_U32,
            block_count: 1,
        }
    }

    /// Serialize the header into the start of block 0.
    pub fn write_to(&self, block: &mut [u8]) {
        block[offsets::MAGIC..offsets::MAGIC + MAGIC.len()].copy_from_slice(&MAGIC);
        write_u32(block, offsets::FORMAT_VERSION, self.format_version);
        write_u32(block, offsets::BLOCK_SIZE, self.block_size);
        write_u64(block, offsets::BLOCK_COUNT, self.block_count);
        let checksum = crc32fast::hash(&block[..offsets::CHECKSUM]);
        write_u32(block, offsets::CHECKSUM, checksum);
    }

    /// Deserialize and validate a header from block 0.
    pub fn read_from(block: &[u8]) -> Result<Self, HeaderError> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&block[offsets::MAGIC..offsets::MAGIC + MAGIC.len()]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }

        let expected = read_u32(block, offsets::CHECKSUM);
        let actual = crc32fast::hash(&block[..offsets::CHECKSUM]);
        if expected != actual {
            return Err(HeaderError::ChecksumMismatch { expected, actual });
        }

        let format_version = read_u32(block, offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(format_version));
        }

        let block_size = read_u32(block, offsets::BLOCK_SIZE);
        if block_size != BLOCK_SIZE_U32 {
            return Err(HeaderError::BlockSizeMismatch(block_size));
        }

        Ok(Self {
            format_version,
            block_size,
            block_count: read_u64(block, offsets::BLOCK_COUNT),
        })
    }

    /// Check the recorded block count against the length of the backing file.
    pub const fn check_file_len(&self, file_len: u64) -> Result<(), HeaderError> {
        if file_len == 0 || file_len % BLOCK_SIZE_U64 != 0 {
            return Err(HeaderError::FileSize(file_len));
        }
        let file_blocks = file_len / BLOCK_SIZE_U64;
        if self.block_count == 0 || self.block_count > file_blocks {
            return Err(HeaderError::BlockCountOutOfRange {
                block_count: self.block_count,
                file_blocks,
            });
        }
        Ok(())
    }
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors related to the header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// File was written with a different block size.
    BlockSizeMismatch(u32),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// File length is zero or not a multiple of the block size.
    FileSize(u64),
    /// Recorded block count does not fit in the file.
    BlockCountOutOfRange {
        block_count: BlockIndex,
        file_blocks: u64,
    },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(m) => write!(f, "invalid magic: {m:?}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::BlockSizeMismatch(s) => {
                write!(f, "block size mismatch: file uses {s}, expected {BLOCK_SIZE}")
            }
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::FileSize(len) => write!(
                f,
                "file corrupt: length {len} is not a non-zero multiple of {BLOCK_SIZE}"
            ),
            Self::BlockCountOutOfRange {
                block_count,
                file_blocks,
            } => write!(
                f,
                "header records {block_count} blocks but file holds {file_blocks}"
            ),
        }
    }
}

impl std::error::Error for HeaderError {}
