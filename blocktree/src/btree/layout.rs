//! Node byte layout and fan-out sizing.
//!
//! A node fills one block:
//!
//! ```text
//! +----------------------+-----------+-----------+-----+-----------+
//! | header (40 bytes)    | entry 0   | entry 1   | ... | entry N-1 |
//! +----------------------+-----------+-----------+-----+-----------+
//!
//! entry = left child (8 bytes) | key (K::SIZE) | record (R::SIZE)
//! ```
//!
//! The fan-out `N` is the largest entry count whose node still fits in a
//! block.

use crate::btree::codec::FixedSize;
use crate::store::BLOCK_SIZE;

/// Size of the node header in bytes.
pub const NODE_HEADER_SIZE: usize = 40;

/// Size of a child reference (a block index) in bytes.
pub const CHILD_REF_SIZE: usize = 8;

/// Smallest usable fan-out.
///
/// Splitting a full node at `N / 2 + 1` must leave an entry to promote.
pub const MIN_FAN_OUT: usize = 3;

/// Size of one entry in bytes.
#[must_use]
pub const fn entry_size(key_size: usize, record_size: usize) -> usize {
    CHILD_REF_SIZE + key_size + record_size
}

/// Size of a node holding `entries` entries.
#[must_use]
pub const fn node_size(entries: usize, key_size: usize, record_size: usize) -> usize {
    NODE_HEADER_SIZE.saturating_add(entries.saturating_mul(entry_size(key_size, record_size)))
}

/// Largest entry count `n` with `node_size(n) <= block_size`.
///
/// Returns 0 when not even an empty node fits.
#[must_use]
pub const fn max_entries(key_size: usize, record_size: usize, block_size: usize) -> usize {
    if node_size(0, key_size, record_size) > block_size {
        return 0;
    }

    // Invariant: `low` fits, `high` does not. Every entry is at least
    // CHILD_REF_SIZE bytes, so `block_size + 1` entries never fit.
    let mut low = 0;
    let mut high = block_size + 1;
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if node_size(mid, key_size, record_size) <= block_size {
            low = mid;
        } else {
            high = mid;
        }
    }
    low
}

/// Largest fan-out for keys `K` and records `R` in a `BLOCK_SIZE` block.
#[must_use]
pub const fn max_fan_out<K: FixedSize, R: FixedSize>() -> usize {
    max_entries(K::SIZE, R::SIZE, BLOCK_SIZE)
}

/// Index of the entry promoted when a node holding `count` entries splits.
#[must_use]
pub const fn split_point(count: usize) -> usize {
    count / 2 + 1
}

/// Byte layout of a node for one key/record type pair and fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub key_size: usize,
    pub record_size: usize,
    pub fan_out: usize,
}

impl NodeLayout {
    /// Layout for `K`/`R` with the given fan-out.
    pub fn new<K: FixedSize, R: FixedSize>(fan_out: usize) -> Result<Self, LayoutError> {
        let maximum = max_fan_out::<K, R>();
        if maximum < MIN_FAN_OUT {
            return Err(LayoutError::EntryTooLarge {
                entry_size: entry_size(K::SIZE, R::SIZE),
                block_size: BLOCK_SIZE,
            });
        }
        if fan_out < MIN_FAN_OUT {
            return Err(LayoutError::FanOutTooSmall {
                fan_out,
                minimum: MIN_FAN_OUT,
            });
        }
        if fan_out > maximum {
            return Err(LayoutError::FanOutTooLarge { fan_out, maximum });
        }

        Ok(Self {
            key_size: K::SIZE,
            record_size: R::SIZE,
            fan_out,
        })
    }

    /// Layout for `K`/`R` using the largest fan-out that fits a block.
    pub fn widest<K: FixedSize, R: FixedSize>() -> Result<Self, LayoutError> {
        Self::new::<K, R>(max_fan_out::<K, R>())
    }

    /// Size of one entry in bytes.
    #[must_use]
    pub const fn entry_size(&self) -> usize {
        entry_size(self.key_size, self.record_size)
    }

    /// Offset of entry `i` (its left child reference).
    #[must_use]
    pub const fn entry_offset(&self, i: usize) -> usize {
        NODE_HEADER_SIZE + i * self.entry_size()
    }

    /// Offset of the key of entry `i`.
    #[must_use]
    pub const fn key_offset(&self, i: usize) -> usize {
        self.entry_offset(i) + CHILD_REF_SIZE
    }

    /// Offset of the record of entry `i`.
    #[must_use]
    pub const fn record_offset(&self, i: usize) -> usize {
        self.key_offset(i) + self.key_size
    }

    /// Bytes used by a full node.
    #[must_use]
    pub const fn node_size(&self) -> usize {
        node_size(self.fan_out, self.key_size, self.record_size)
    }
}

/// Errors in choosing or matching a node layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Fan-out below the minimum that splitting needs.
    FanOutTooSmall { fan_out: usize, minimum: usize },
    /// Fan-out whose node would overflow a block.
    FanOutTooLarge { fan_out: usize, maximum: usize },
    /// Entries too large to fit `MIN_FAN_OUT` of them in a block.
    EntryTooLarge {
        entry_size: usize,
        block_size: usize,
    },
    /// An existing file was written with a different layout.
    Mismatch {
        field: &'static str,
        stored: usize,
        expected: usize,
    },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FanOutTooSmall { fan_out, minimum } => {
                write!(f, "fan-out {fan_out} is below the minimum of {minimum}")
            }
            Self::FanOutTooLarge { fan_out, maximum } => {
                write!(f, "fan-out {fan_out} exceeds the block capacity of {maximum}")
            }
            Self::EntryTooLarge {
                entry_size,
                block_size,
            } => write!(
                f,
                "entries of {entry_size} bytes do not fit {MIN_FAN_OUT} to a {block_size} byte block"
            ),
            Self::Mismatch {
                field,
                stored,
                expected,
            } => write!(f, "{field} mismatch: file has {stored}, expected {expected}"),
        }
    }
}

impl std::error::Error for LayoutError {}
