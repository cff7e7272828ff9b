//! Node views over raw block bytes.
//!
//! A node is never held as an owned object. [`NodeRef`] and [`NodeMut`]
//! wrap the bytes of one block for a single engine step and decode keys and
//! records on demand.
//!
//! Header layout (little-endian):
//! - `tag`: 1 byte (always `NODE_TAG`), 1 reserved byte
//! - `key_size`: 2 bytes
//! - `record_size`: 2 bytes, 2 reserved bytes
//! - `fan_out`: 4 bytes
//! - `count`: 4 bytes
//! - `self_ref`: 8 bytes
//! - `parent`: 8 bytes (0 for the root)
//! - `rightmost`: 8 bytes (0 for a leaf)
//!
//! Total: 40 bytes

#![allow(clippy::cast_possible_truncation)]

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::Range;

use crate::btree::codec::FixedSize;
use crate::btree::layout::NodeLayout;
use crate::bytes::{read_u16, read_u32, read_u64, write_u16, write_u32, write_u64};
use crate::store::{BlockIndex, NULL_BLOCK};

/// Tag byte identifying a block as a tree node.
pub const NODE_TAG: u8 = 0xB7;

const TAG_OFFSET: usize = 0;
const KEY_SIZE_OFFSET: usize = 2;
const RECORD_SIZE_OFFSET: usize = 4;
const FAN_OUT_OFFSET: usize = 8;
const COUNT_OFFSET: usize = 12;
const SELF_REF_OFFSET: usize = 16;
const PARENT_OFFSET: usize = 24;
const RIGHTMOST_OFFSET: usize = 32;

fn read_ref(bytes: &[u8], offset: usize) -> Option<BlockIndex> {
    let raw = read_u64(bytes, offset);
    (raw != NULL_BLOCK).then_some(raw)
}

fn write_ref(bytes: &mut [u8], offset: usize, reference: Option<BlockIndex>) {
    write_u64(bytes, offset, reference.unwrap_or(NULL_BLOCK));
}

/// Decoded node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub key_size: u16,
    pub record_size: u16,
    pub fan_out: u32,
    pub count: u32,
    pub self_ref: BlockIndex,
    pub parent: Option<BlockIndex>,
    pub rightmost: Option<BlockIndex>,
}

impl NodeHeader {
    /// Read the header of a node block.
    pub fn read(bytes: &[u8]) -> Result<Self, NodeError> {
        let tag = bytes[TAG_OFFSET];
        if tag != NODE_TAG {
            return Err(NodeError::InvalidTag(tag));
        }

        Ok(Self {
            key_size: read_u16(bytes, KEY_SIZE_OFFSET),
            record_size: read_u16(bytes, RECORD_SIZE_OFFSET),
            fan_out: read_u32(bytes, FAN_OUT_OFFSET),
            count: read_u32(bytes, COUNT_OFFSET),
            self_ref: read_u64(bytes, SELF_REF_OFFSET),
            parent: read_ref(bytes, PARENT_OFFSET),
            rightmost: read_ref(bytes, RIGHTMOST_OFFSET),
        })
    }

    /// Write the header at the start of a block.
    pub fn write_to(&self, bytes: &mut [u8]) {
        bytes[TAG_OFFSET] = NODE_TAG;
        bytes[TAG_OFFSET + 1] = 0;
        write_u16(bytes, KEY_SIZE_OFFSET, self.key_size);
        write_u16(bytes, RECORD_SIZE_OFFSET, self.record_size);
        write_u16(bytes, RECORD_SIZE_OFFSET + 2, 0);
        write_u32(bytes, FAN_OUT_OFFSET, self.fan_out);
        write_u32(bytes, COUNT_OFFSET, self.count);
        write_u64(bytes, SELF_REF_OFFSET, self.self_ref);
        write_ref(bytes, PARENT_OFFSET, self.parent);
        write_ref(bytes, RIGHTMOST_OFFSET, self.rightmost);
    }

    /// Check that this header was written with `layout`.
    pub fn check(&self, layout: &NodeLayout) -> Result<(), NodeError> {
        let key_size = usize::from(self.key_size);
        if key_size != layout.key_size {
            return Err(NodeError::KeySizeMismatch {
                stored: key_size,
                expected: layout.key_size,
            });
        }
        let record_size = usize::from(self.record_size);
        if record_size != layout.record_size {
            return Err(NodeError::RecordSizeMismatch {
                stored: record_size,
                expected: layout.record_size,
            });
        }
        let fan_out = self.fan_out as usize;
        if fan_out != layout.fan_out {
            return Err(NodeError::FanOutMismatch {
                stored: fan_out,
                expected: layout.fan_out,
            });
        }
        let count = self.count as usize;
        if count > layout.fan_out {
            return Err(NodeError::CountOutOfRange {
                count,
                fan_out: layout.fan_out,
            });
        }
        Ok(())
    }
}

/// An owned copy of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, R> {
    /// Subtree of keys below `key` (and above the previous entry's key).
    pub left_child: Option<BlockIndex>,
    pub key: K,
    pub record: R,
}

/// Read-only view of a node.
pub struct NodeRef<'a, K, R> {
    bytes: &'a [u8],
    layout: NodeLayout,
    _marker: PhantomData<(K, R)>,
}

impl<'a, K: FixedSize, R: FixedSize> NodeRef<'a, K, R> {
    /// View a block as a node, rejecting blocks written with another layout.
    pub fn new(bytes: &'a [u8], layout: NodeLayout) -> Result<Self, NodeError> {
        NodeHeader::read(bytes)?.check(&layout)?;
        Ok(Self {
            bytes,
            layout,
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub fn count(&self) -> usize {
        read_u32(self.bytes, COUNT_OFFSET) as usize
    }

    #[must_use]
    pub const fn fan_out(&self) -> usize {
        self.layout.fan_out
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count() >= self.layout.fan_out
    }

    /// A leaf has no rightmost child (and no left children).
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.rightmost().is_none()
    }

    #[must_use]
    pub fn self_ref(&self) -> BlockIndex {
        read_u64(self.bytes, SELF_REF_OFFSET)
    }

    #[must_use]
    pub fn parent(&self) -> Option<BlockIndex> {
        read_ref(self.bytes, PARENT_OFFSET)
    }

    #[must_use]
    pub fn rightmost(&self) -> Option<BlockIndex> {
        read_ref(self.bytes, RIGHTMOST_OFFSET)
    }

    #[must_use]
    pub fn key(&self, i: usize) -> K {
        debug_assert!(i < self.count());
        K::decode(&self.bytes[self.layout.key_offset(i)..])
    }

    #[must_use]
    pub fn record(&self, i: usize) -> R {
        debug_assert!(i < self.count());
        R::decode(&self.bytes[self.layout.record_offset(i)..])
    }

    #[must_use]
    pub fn left_child(&self, i: usize) -> Option<BlockIndex> {
        debug_assert!(i < self.count());
        read_ref(self.bytes, self.layout.entry_offset(i))
    }

    #[must_use]
    pub fn entry(&self, i: usize) -> Entry<K, R> {
        Entry {
            left_child: self.left_child(i),
            key: self.key(i),
            record: self.record(i),
        }
    }

    /// All keys in node order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        (0..self.count()).map(|i| self.key(i)).collect()
    }

    /// Child reference in `slot`, where slot `count` is the rightmost child.
    #[must_use]
    pub fn child(&self, slot: usize) -> Option<BlockIndex> {
        if slot < self.count() {
            self.left_child(slot)
        } else {
            self.rightmost()
        }
    }

    /// Slot holding a reference to `child`, if any.
    #[must_use]
    pub fn child_slot(&self, child: BlockIndex) -> Option<usize> {
        (0..=self.count()).find(|&slot| self.child(slot) == Some(child))
    }

    /// Every child reference, left to right.
    #[must_use]
    pub fn children(&self) -> Vec<BlockIndex> {
        (0..=self.count())
            .filter_map(|slot| self.child(slot))
            .collect()
    }

    /// Encoded bytes of a run of entries.
    #[must_use]
    pub fn raw_entries(&self, range: Range<usize>) -> &'a [u8] {
        &self.bytes[self.layout.entry_offset(range.start)..self.layout.entry_offset(range.end)]
    }
}

impl<K: FixedSize + Ord, R: FixedSize> NodeRef<'_, K, R> {
    /// Binary search for `key` among this node's entries.
    ///
    /// `Ok(i)` is an exact match; `Err(i)` is the slot whose child subtree
    /// would hold the key, which is also the insertion position.
    pub fn search(&self, key: &K) -> Result<usize, usize> {
        let mut low = 0;
        let mut high = self.count();
        while low < high {
            let mid = low + (high - low) / 2;
            match self.key(mid).cmp(key) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }
}

/// Mutable view of a node.
pub struct NodeMut<'a, K, R> {
    bytes: &'a mut [u8],
    layout: NodeLayout,
    _marker: PhantomData<(K, R)>,
}

impl<'a, K: FixedSize, R: FixedSize> NodeMut<'a, K, R> {
    /// View a block as a node for writing.
    pub fn new(bytes: &'a mut [u8], layout: NodeLayout) -> Result<Self, NodeError> {
        NodeHeader::read(bytes)?.check(&layout)?;
        Ok(Self {
            bytes,
            layout,
            _marker: PhantomData,
        })
    }

    /// Format a block as an empty leaf.
    pub fn init(
        bytes: &'a mut [u8],
        layout: NodeLayout,
        self_ref: BlockIndex,
        parent: Option<BlockIndex>,
    ) -> Self {
        let header = NodeHeader {
            key_size: layout.key_size as u16,
            record_size: layout.record_size as u16,
            fan_out: layout.fan_out as u32,
            count: 0,
            self_ref,
            parent,
            rightmost: None,
        };
        header.write_to(bytes);

        Self {
            bytes,
            layout,
            _marker: PhantomData,
        }
    }

    /// Read-only view of the same bytes.
    #[must_use]
    pub fn view(&self) -> NodeRef<'_, K, R> {
        NodeRef {
            bytes: &*self.bytes,
            layout: self.layout,
            _marker: PhantomData,
        }
    }

    pub fn set_parent(&mut self, parent: Option<BlockIndex>) {
        write_ref(self.bytes, PARENT_OFFSET, parent);
    }

    pub fn set_rightmost(&mut self, rightmost: Option<BlockIndex>) {
        write_ref(self.bytes, RIGHTMOST_OFFSET, rightmost);
    }

    pub fn set_left_child(&mut self, i: usize, child: Option<BlockIndex>) {
        debug_assert!(i < self.view().count());
        write_ref(self.bytes, self.layout.entry_offset(i), child);
    }

    /// Replace the child reference in `slot` (slot `count` is the rightmost).
    pub fn set_child(&mut self, slot: usize, child: Option<BlockIndex>) {
        if slot < self.view().count() {
            self.set_left_child(slot, child);
        } else {
            self.set_rightmost(child);
        }
    }

    fn set_count(&mut self, count: usize) {
        write_u32(self.bytes, COUNT_OFFSET, count as u32);
    }

    /// Drop every entry from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        if len < self.view().count() {
            self.set_count(len);
        }
    }

    /// Insert `entry` at `pos`, shifting later entries right.
    pub fn insert_at(&mut self, pos: usize, entry: &Entry<K, R>) -> Result<(), NodeError> {
        let count = self.view().count();
        if count >= self.layout.fan_out {
            return Err(NodeError::NodeFull {
                fan_out: self.layout.fan_out,
            });
        }
        debug_assert!(pos <= count);

        let start = self.layout.entry_offset(pos);
        let end = self.layout.entry_offset(count);
        self.bytes
            .copy_within(start..end, start + self.layout.entry_size());
        self.write_entry(pos, entry);
        self.set_count(count + 1);
        Ok(())
    }

    /// Append already-encoded entries taken from another node of the same
    /// layout.
    pub fn append_raw(&mut self, raw: &[u8]) -> Result<(), NodeError> {
        debug_assert_eq!(raw.len() % self.layout.entry_size(), 0);
        let count = self.view().count();
        let added = raw.len() / self.layout.entry_size();
        if count + added > self.layout.fan_out {
            return Err(NodeError::NodeFull {
                fan_out: self.layout.fan_out,
            });
        }

        let start = self.layout.entry_offset(count);
        self.bytes[start..start + raw.len()].copy_from_slice(raw);
        self.set_count(count + added);
        Ok(())
    }

    fn write_entry(&mut self, i: usize, entry: &Entry<K, R>) {
        write_ref(self.bytes, self.layout.entry_offset(i), entry.left_child);

        let key_start = self.layout.key_offset(i);
        entry
            .key
            .encode_into(&mut self.bytes[key_start..key_start + K::SIZE]);

        let record_start = self.layout.record_offset(i);
        entry
            .record
            .encode_into(&mut self.bytes[record_start..record_start + R::SIZE]);
    }
}

/// Errors reading or writing a node block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The block is not a node.
    InvalidTag(u8),
    /// Node written for keys of another size.
    KeySizeMismatch { stored: usize, expected: usize },
    /// Node written for records of another size.
    RecordSizeMismatch { stored: usize, expected: usize },
    /// Node written with another fan-out.
    FanOutMismatch { stored: usize, expected: usize },
    /// Entry count larger than the fan-out.
    CountOutOfRange { count: usize, fan_out: usize },
    /// No room for another entry.
    NodeFull { fan_out: usize },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(tag) => write!(f, "invalid node tag {tag:#04x}"),
            Self::KeySizeMismatch { stored, expected } => {
                write!(f, "key size mismatch: node has {stored}, expected {expected}")
            }
            Self::RecordSizeMismatch { stored, expected } => write!(
                f,
                "record size mismatch: node has {stored}, expected {expected}"
            ),
            Self::FanOutMismatch { stored, expected } => {
                write!(f, "fan-out mismatch: node has {stored}, expected {expected}")
            }
            Self::CountOutOfRange { count, fan_out } => {
                write!(f, "entry count {count} exceeds fan-out {fan_out}")
            }
            Self::NodeFull { fan_out } => write!(f, "node is full ({fan_out} entries)"),
        }
    }
}

impl std::error::Error for NodeError {}
