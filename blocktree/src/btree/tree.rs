//! B-tree handle.
//!
//! `BTree` owns a block store and the current root index. The root moves
//! whenever a split promotes a new root; the handle re-derives it by
//! walking parent links after every insert, and once when the tree is
//! opened, since a previous session may have left block 1 (the first root)
//! deep inside the tree.

use std::fmt::Debug;
use std::marker::PhantomData;

use tracing::info;

use crate::btree::codec::FixedSize;
use crate::btree::engine::{Nodes, TreeStats};
use crate::btree::layout::{LayoutError, NodeLayout};
use crate::btree::node::{NodeError, NodeHeader};
use crate::config::TreeConfig;
use crate::store::{BlockIndex, BlockStore, StoreError};

/// Block holding the first root of every tree.
pub const ROOT_SLOT: BlockIndex = 1;

/// A B-tree of fixed-size keys and records stored in a block store.
pub struct BTree<S, K, R> {
    store: S,
    root: BlockIndex,
    layout: NodeLayout,
    _marker: PhantomData<(K, R)>,
}

impl<S, K, R> BTree<S, K, R>
where
    S: BlockStore,
    K: FixedSize + Ord + Clone + Debug,
    R: FixedSize,
{
    /// Open the tree in `store`, creating it if the store is empty.
    pub fn open(store: S) -> Result<Self, BTreeError> {
        Self::open_with(store, &TreeConfig::default())
    }

    /// Open the tree in `store` with explicit configuration.
    ///
    /// An existing tree must have been written for the same key and record
    /// sizes. Without a configured fan-out, the fan-out recorded in the file
    /// is adopted.
    pub fn open_with(mut store: S, config: &TreeConfig) -> Result<Self, BTreeError> {
        if store.block_count() > ROOT_SLOT {
            let header = NodeHeader::read(store.block(ROOT_SLOT)?)?;
            let layout = stored_layout::<K, R>(&header, config)?;
            let root = Nodes::<S, K, R>::new(&mut store, layout).find_root(ROOT_SLOT)?;

            info!(root, fan_out = layout.fan_out, "opened tree");
            return Ok(Self {
                store,
                root,
                layout,
                _marker: PhantomData,
            });
        }

        let layout = match config.fan_out {
            Some(fan_out) => NodeLayout::new::<K, R>(fan_out)?,
            None => NodeLayout::widest::<K, R>()?,
        };
        let root = Nodes::<S, K, R>::new(&mut store, layout).allocate(None)?;
        if root != ROOT_SLOT {
            return Err(BTreeError::Corrupt(format!(
                "first node allocated at block {root}, expected {ROOT_SLOT}"
            )));
        }

        info!(root, fan_out = layout.fan_out, "created tree");
        Ok(Self {
            store,
            root,
            layout,
            _marker: PhantomData,
        })
    }

    const fn nodes(&mut self) -> Nodes<'_, S, K, R> {
        Nodes::new(&mut self.store, self.layout)
    }

    /// Look up the record stored under `key`.
    pub fn find(&mut self, key: &K) -> Result<Option<R>, BTreeError> {
        let root = self.root;
        let (record, _) = self.nodes().find_record_and_node(root, key)?;
        Ok(record)
    }

    /// Insert a new key. Existing keys are never overwritten.
    ///
    /// The cached root is refreshed even when the insert fails, since a
    /// split may have completed before the failure.
    pub fn insert(&mut self, key: K, record: R) -> Result<(), BTreeError> {
        let root = self.root;
        let result = self.nodes().insert(root, key, record);

        match self.nodes().find_root(root) {
            Ok(new_root) => self.root = new_root,
            Err(e) if result.is_ok() => return Err(e),
            Err(_) => {}
        }
        result
    }

    /// Check every structural invariant of the tree.
    pub fn validate(&mut self) -> Result<(), BTreeError> {
        let root = self.root;
        self.nodes().validate(root)
    }

    /// Number of levels, counting the root; 1 for a single leaf.
    pub fn depth(&mut self) -> Result<usize, BTreeError> {
        let root = self.root;
        self.nodes().depth(root)
    }

    /// Indented rendering of every node.
    pub fn dump(&mut self) -> Result<String, BTreeError> {
        let root = self.root;
        self.nodes().dump_tree(root)
    }

    pub fn stats(&mut self) -> Result<TreeStats, BTreeError> {
        let root = self.root;
        self.nodes().stats(root)
    }

    /// Block index of the current root.
    #[must_use]
    pub const fn root(&self) -> BlockIndex {
        self.root
    }

    #[must_use]
    pub const fn fan_out(&self) -> usize {
        self.layout.fan_out
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Flush the store to durable storage.
    pub fn sync(&mut self) -> Result<(), BTreeError> {
        Ok(self.store.sync()?)
    }

    /// Close the tree, returning its store.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }
}

/// Layout of an existing tree, checked against `K`, `R` and `config`.
fn stored_layout<K: FixedSize, R: FixedSize>(
    header: &NodeHeader,
    config: &TreeConfig,
) -> Result<NodeLayout, BTreeError> {
    let mismatch = |field, stored: usize, expected: usize| {
        BTreeError::Layout(LayoutError::Mismatch {
            field,
            stored,
            expected,
        })
    };

    let key_size = usize::from(header.key_size);
    if key_size != K::SIZE {
        return Err(mismatch("key size", key_size, K::SIZE));
    }
    let record_size = usize::from(header.record_size);
    if record_size != R::SIZE {
        return Err(mismatch("record size", record_size, R::SIZE));
    }

    let stored = usize::try_from(header.fan_out)
        .map_err(|_| BTreeError::Corrupt(format!("fan-out {} out of range", header.fan_out)))?;
    if let Some(fan_out) = config.fan_out
        && fan_out != stored
    {
        return Err(mismatch("fan-out", stored, fan_out));
    }

    Ok(NodeLayout::new::<K, R>(stored)?)
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Block store error.
    Store(StoreError),
    /// A block could not be read or written as a node.
    Node(NodeError),
    /// Key, record or fan-out do not fit the file or a block.
    Layout(LayoutError),
    /// The key is already present; nothing was changed.
    DuplicateKey { key: String },
    /// `validate` found a broken invariant.
    InvariantViolation {
        node: BlockIndex,
        reason: String,
        dump: String,
    },
    /// References that no well-formed tree can contain.
    Corrupt(String),
}

impl BTreeError {
    /// Whether the tree is known to be unchanged and usable after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Layout(e) => write!(f, "layout error: {e}"),
            Self::DuplicateKey { key } => write!(f, "duplicate key {key}"),
            Self::InvariantViolation { node, reason, .. } => {
                write!(f, "invariant violated at block {node}: {reason}")
            }
            Self::Corrupt(message) => write!(f, "corrupt tree: {message}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Layout(e) => Some(e),
            Self::DuplicateKey { .. } | Self::InvariantViolation { .. } | Self::Corrupt(_) => None,
        }
    }
}

impl From<StoreError> for BTreeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<LayoutError> for BTreeError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}
