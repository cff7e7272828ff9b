//! Tree algorithms over index-addressed nodes.
//!
//! [`Nodes`] borrows the block store for one public tree operation and
//! resolves every node from its block index at each step. Nothing here
//! caches a node view across a store access.
//!
//! Inserts always start from the root. When the target node is full,
//! `make_room` first makes room in the parent (recursively, up to the
//! root), then splits the node, and the insert restarts from the root.
//!
//! A split of a node holding `N` entries promotes entry `N/2 + 1`:
//!
//! ```text
//!            before                          after
//!
//!   P: [ .. ->X .. ]               P: [ .. (m, left=X) ->S .. ]
//!   X: [e0 .. em .. eN-1] ->r      X: [e0 .. em-1] ->em.left
//!                                  S: [em+1 .. eN-1] ->r
//! ```
//!
//! Every block a split needs is allocated before any entry moves, so an
//! allocation failure leaves the tree unchanged.

use std::fmt::Debug;
use std::marker::PhantomData;

use tracing::{debug, error, info, trace};

use crate::btree::codec::FixedSize;
use crate::btree::layout::{NodeLayout, split_point};
use crate::btree::node::{Entry, NodeError, NodeHeader, NodeMut, NodeRef};
use crate::btree::tree::BTreeError;
use crate::store::{BlockIndex, BlockStore};

/// Summary of a tree's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Nodes reachable from the root.
    pub nodes: u64,
    /// Leaf nodes among them.
    pub leaves: u64,
    /// Entries (keys) stored in the tree.
    pub entries: u64,
    /// Levels from the root to the leaves.
    pub depth: usize,
    pub fan_out: usize,
}

/// A parent slot to point at a new sibling while inserting a promoted entry.
#[derive(Debug, Clone, Copy)]
struct Redirect {
    from: BlockIndex,
    to: BlockIndex,
}

/// One pending node in a validation walk.
struct Check<K> {
    index: BlockIndex,
    parent: Option<BlockIndex>,
    lower: Option<K>,
    upper: Option<K>,
    depth: usize,
}

/// Node access for one tree operation.
pub(crate) struct Nodes<'s, S, K, R> {
    store: &'s mut S,
    layout: NodeLayout,
    _marker: PhantomData<(K, R)>,
}

impl<'s, S, K, R> Nodes<'s, S, K, R>
where
    S: BlockStore,
    K: FixedSize + Ord + Clone + Debug,
    R: FixedSize,
{
    pub(crate) const fn new(store: &'s mut S, layout: NodeLayout) -> Self {
        Self {
            store,
            layout,
            _marker: PhantomData,
        }
    }

    fn node(&mut self, index: BlockIndex) -> Result<NodeRef<'_, K, R>, BTreeError> {
        let bytes = self.store.block(index)?;
        Ok(NodeRef::new(bytes, self.layout)?)
    }

    fn node_mut(&mut self, index: BlockIndex) -> Result<NodeMut<'_, K, R>, BTreeError> {
        let bytes = self.store.block_mut(index)?;
        Ok(NodeMut::new(bytes, self.layout)?)
    }

    /// Allocate and format an empty node.
    pub(crate) fn allocate(&mut self, parent: Option<BlockIndex>) -> Result<BlockIndex, BTreeError> {
        let layout = self.layout;
        let (index, bytes) = self.store.allocate_block()?;
        NodeMut::<K, R>::init(bytes, layout, index, parent);
        trace!(index, ?parent, "allocated node");
        Ok(index)
    }

    fn set_parent(&mut self, child: BlockIndex, parent: BlockIndex) -> Result<(), BTreeError> {
        self.node_mut(child)?.set_parent(Some(parent));
        Ok(())
    }

    /// Walk parent links from `start` up to the root.
    pub(crate) fn find_root(&mut self, start: BlockIndex) -> Result<BlockIndex, BTreeError> {
        let mut current = start;
        for _ in 0..self.store.block_count() {
            match self.node(current)?.parent() {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(BTreeError::Corrupt(format!(
            "parent chain from block {start} does not end at a root"
        )))
    }

    /// Search for `key` from `root`.
    ///
    /// Returns the record if the key is present, and the node that holds
    /// the key or, on a miss, the leaf where it belongs.
    pub(crate) fn find_record_and_node(
        &mut self,
        root: BlockIndex,
        key: &K,
    ) -> Result<(Option<R>, BlockIndex), BTreeError> {
        let mut current = root;
        for _ in 0..self.store.block_count() {
            let node = self.node(current)?;
            match node.search(key) {
                Ok(i) => return Ok((Some(node.record(i)), current)),
                Err(slot) => match node.child(slot) {
                    Some(child) => current = child,
                    None => return Ok((None, current)),
                },
            }
        }
        Err(BTreeError::Corrupt(format!(
            "search from block {root} did not reach a leaf"
        )))
    }

    /// Insert a new key, splitting full nodes on the way.
    pub(crate) fn insert(&mut self, root: BlockIndex, key: K, record: R) -> Result<(), BTreeError> {
        let mut root = root;
        loop {
            root = self.find_root(root)?;
            let (found, target) = self.find_record_and_node(root, &key)?;
            if found.is_some() {
                return Err(BTreeError::DuplicateKey {
                    key: format!("{key:?}"),
                });
            }

            if !self.node(target)?.is_full() {
                let entry = Entry {
                    left_child: None,
                    key,
                    record,
                };
                return self.insert_into_node(target, entry, None);
            }

            self.make_room(target)?;
        }
    }

    /// Split `index` if it is full, making room in its ancestors first.
    fn make_room(&mut self, index: BlockIndex) -> Result<(), BTreeError> {
        let node = self.node(index)?;
        if !node.is_full() {
            return Ok(());
        }

        match node.parent() {
            None => self.split_root(index),
            Some(parent) => {
                self.make_room(parent)?;
                self.split_node(index)
            }
        }
    }

    /// Split a non-root node into its parent, which must have room.
    fn split_node(&mut self, index: BlockIndex) -> Result<(), BTreeError> {
        // Re-read: making room above may have moved this node to a new parent.
        let parent = self.node(index)?.parent().ok_or_else(|| {
            BTreeError::Corrupt(format!("block {index} lost its parent during a split"))
        })?;
        if self.node(parent)?.is_full() {
            return Err(NodeError::NodeFull {
                fan_out: self.layout.fan_out,
            }
            .into());
        }

        let sibling = self.allocate(Some(parent))?;
        let promoted = self.split_entries(index, sibling)?;
        self.insert_into_node(
            parent,
            promoted,
            Some(Redirect {
                from: index,
                to: sibling,
            }),
        )
    }

    /// Split the root under a freshly allocated root.
    fn split_root(&mut self, index: BlockIndex) -> Result<(), BTreeError> {
        let new_root = self.allocate(None)?;
        let sibling = self.allocate(Some(new_root))?;

        let promoted = self.split_entries(index, sibling)?;
        self.node_mut(new_root)?.set_rightmost(Some(sibling));
        self.insert_into_node(new_root, promoted, None)?;

        info!(old_root = index, new_root, "promoted new root");
        Ok(())
    }

    /// Move the upper half of `index` into the empty node `sibling`.
    ///
    /// Returns the promoted entry, whose left child is now `index`.
    fn split_entries(
        &mut self,
        index: BlockIndex,
        sibling: BlockIndex,
    ) -> Result<Entry<K, R>, BTreeError> {
        let (middle, promoted, moved, moved_children, rightmost) = {
            let node = self.node(index)?;
            let count = node.count();
            let middle = split_point(count);
            if middle >= count {
                return Err(BTreeError::Corrupt(format!(
                    "block {index} has {count} entries, too few to split"
                )));
            }
            let moved_children: Vec<BlockIndex> = (middle + 1..count)
                .filter_map(|i| node.left_child(i))
                .collect();
            (
                middle,
                node.entry(middle),
                node.raw_entries(middle + 1..count).to_vec(),
                moved_children,
                node.rightmost(),
            )
        };

        {
            let mut node = self.node_mut(sibling)?;
            node.append_raw(&moved)?;
            node.set_rightmost(rightmost);
        }
        {
            let mut node = self.node_mut(index)?;
            node.truncate(middle);
            node.set_rightmost(promoted.left_child);
        }

        for child in moved_children.into_iter().chain(rightmost) {
            self.set_parent(child, sibling)?;
        }

        debug!(
            node = index,
            sibling,
            moved = moved.len() / self.layout.entry_size(),
            "split node"
        );

        Ok(Entry {
            left_child: Some(index),
            ..promoted
        })
    }

    /// Insert `entry` at its sorted position in `index`.
    ///
    /// With a redirect, the slot referencing `from` is pointed at `to`
    /// first; the new entry then lands directly in front of it. Children
    /// named by the entry and the redirect are reparented to `index`.
    fn insert_into_node(
        &mut self,
        index: BlockIndex,
        entry: Entry<K, R>,
        redirect: Option<Redirect>,
    ) -> Result<(), BTreeError> {
        {
            let mut node = self.node_mut(index)?;
            if node.view().is_full() {
                return Err(NodeError::NodeFull {
                    fan_out: node.view().fan_out(),
                }
                .into());
            }
            let pos = match node.view().search(&entry.key) {
                Ok(_) => {
                    return Err(BTreeError::DuplicateKey {
                        key: format!("{:?}", entry.key),
                    });
                }
                Err(pos) => pos,
            };

            if let Some(Redirect { from, to }) = redirect {
                let slot = node.view().child_slot(from).ok_or_else(|| {
                    BTreeError::Corrupt(format!("block {index} has no child reference to {from}"))
                })?;
                node.set_child(slot, Some(to));
            }
            node.insert_at(pos, &entry)?;
        }

        if let Some(child) = entry.left_child {
            self.set_parent(child, index)?;
        }
        if let Some(Redirect { to, .. }) = redirect {
            self.set_parent(to, index)?;
        }
        Ok(())
    }

    /// Levels from `root` down the leftmost chain.
    pub(crate) fn depth(&mut self, root: BlockIndex) -> Result<usize, BTreeError> {
        let mut current = root;
        let mut depth = 1;
        for _ in 0..self.store.block_count() {
            match self.node(current)?.child(0) {
                Some(child) => {
                    current = child;
                    depth += 1;
                }
                None => return Ok(depth),
            }
        }
        Err(BTreeError::Corrupt(format!(
            "leftmost chain from block {root} did not reach a leaf"
        )))
    }

    /// Count nodes, leaves and entries with an explicit stack.
    pub(crate) fn stats(&mut self, root: BlockIndex) -> Result<TreeStats, BTreeError> {
        let mut stats = TreeStats {
            nodes: 0,
            leaves: 0,
            entries: 0,
            depth: 0,
            fan_out: self.layout.fan_out,
        };
        let limit = self.store.block_count();
        let mut stack = vec![(root, 1)];

        while let Some((index, depth)) = stack.pop() {
            stats.nodes += 1;
            if stats.nodes >= limit {
                return Err(BTreeError::Corrupt(format!(
                    "tree under block {root} visits more nodes than the store holds"
                )));
            }

            let node = self.node(index)?;
            stats.entries += node.count() as u64;
            stats.depth = stats.depth.max(depth);
            if node.is_leaf() {
                stats.leaves += 1;
            }
            stack.extend(node.children().into_iter().rev().map(|c| (c, depth + 1)));
        }

        Ok(stats)
    }

    /// Check every structural invariant of the tree under `root`.
    pub(crate) fn validate(&mut self, root: BlockIndex) -> Result<(), BTreeError> {
        let mut leaf_depth = None;
        self.validate_node(
            Check {
                index: root,
                parent: None,
                lower: None,
                upper: None,
                depth: 1,
            },
            &mut leaf_depth,
        )
    }

    fn validate_node(
        &mut self,
        check: Check<K>,
        leaf_depth: &mut Option<usize>,
    ) -> Result<(), BTreeError> {
        let Check {
            index,
            parent,
            lower,
            upper,
            depth,
        } = check;

        if depth as u64 >= self.store.block_count() {
            return Err(self.violation(index, format!("depth {depth} exceeds the block count")));
        }

        if let Err(e) = self.node(index).map(|_| ()) {
            return Err(match e {
                BTreeError::Node(e) => self.violation(index, e.to_string()),
                e => e,
            });
        }

        let (self_ref, node_parent, rightmost, keys, children) = {
            let node = self.node(index)?;
            (
                node.self_ref(),
                node.parent(),
                node.rightmost(),
                node.keys(),
                (0..node.count())
                    .map(|i| node.left_child(i))
                    .collect::<Vec<_>>(),
            )
        };

        if self_ref != index {
            return Err(self.violation(index, format!("self reference is {self_ref}")));
        }
        if node_parent != parent {
            return Err(self.violation(
                index,
                format!("parent is {node_parent:?}, expected {parent:?}"),
            ));
        }

        for (i, key) in keys.iter().enumerate() {
            if i > 0 && keys[i - 1] >= *key {
                return Err(self.violation(index, format!("key {i} is out of order")));
            }
            if lower.as_ref().is_some_and(|lower| key <= lower) {
                return Err(self.violation(index, format!("key {i} is below its subtree bound")));
            }
            if upper.as_ref().is_some_and(|upper| key >= upper) {
                return Err(self.violation(index, format!("key {i} is above its subtree bound")));
            }
        }

        let Some(rightmost) = rightmost else {
            if children.iter().any(Option::is_some) {
                return Err(self.violation(index, "leaf has a left child".to_string()));
            }
            return match *leaf_depth {
                Some(expected) if expected != depth => Err(self.violation(
                    index,
                    format!("leaf at depth {depth}, other leaves at {expected}"),
                )),
                _ => {
                    *leaf_depth = Some(depth);
                    Ok(())
                }
            };
        };

        let mut left_bound = lower;
        for (i, child) in children.into_iter().enumerate() {
            let Some(child) = child else {
                return Err(self.violation(index, format!("internal entry {i} has no left child")));
            };
            self.validate_node(
                Check {
                    index: child,
                    parent: Some(index),
                    lower: left_bound,
                    upper: Some(keys[i].clone()),
                    depth: depth + 1,
                },
                leaf_depth,
            )?;
            left_bound = Some(keys[i].clone());
        }

        self.validate_node(
            Check {
                index: rightmost,
                parent: Some(index),
                lower: left_bound,
                upper,
                depth: depth + 1,
            },
            leaf_depth,
        )
    }

    /// Build (and log) an invariant violation for `index`.
    fn violation(&mut self, index: BlockIndex, reason: String) -> BTreeError {
        let dump = self
            .dump_node(index)
            .unwrap_or_else(|e| format!("[NODE {index}] unreadable: {e}\n"));
        error!(node = index, %reason, "tree invariant violated\n{dump}");
        BTreeError::InvariantViolation {
            node: index,
            reason,
            dump,
        }
    }

    /// Render one node: header line plus one line per entry.
    pub(crate) fn dump_node(&mut self, index: BlockIndex) -> Result<String, BTreeError> {
        let header = NodeHeader::read(self.store.block(index)?)?;
        let mut out = format!(
            "[NODE {index}] self={} parent={} rightmost={} count={}/{}\n",
            header.self_ref,
            format_ref(header.parent),
            format_ref(header.rightmost),
            header.count,
            header.fan_out,
        );

        match self.node(index) {
            Ok(node) => {
                for i in 0..node.count() {
                    out.push_str(&format!(
                        "  [{i}] left={} key={:?}\n",
                        format_ref(node.left_child(i)),
                        node.key(i)
                    ));
                }
            }
            Err(e) => out.push_str(&format!("  entries unreadable: {e}\n")),
        }
        Ok(out)
    }

    /// Render the whole tree under `root`, subtrees indented under the
    /// keys that bound them.
    pub(crate) fn dump_tree(&mut self, root: BlockIndex) -> Result<String, BTreeError> {
        let mut out = String::new();
        self.dump_subtree(root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_subtree(
        &mut self,
        index: BlockIndex,
        level: usize,
        out: &mut String,
    ) -> Result<(), BTreeError> {
        if level as u64 >= self.store.block_count() {
            return Err(BTreeError::Corrupt(format!(
                "dump of block {index} exceeds the block count in depth"
            )));
        }

        let indent = "  ".repeat(level);
        let (count, fan_out, parent, keys, children) = {
            let node = self.node(index)?;
            (
                node.count(),
                node.fan_out(),
                node.parent(),
                node.keys(),
                (0..=node.count()).map(|slot| node.child(slot)).collect::<Vec<_>>(),
            )
        };
        out.push_str(&format!(
            "{indent}[NODE {index}] parent={} count={count}/{fan_out}\n",
            format_ref(parent)
        ));

        for (slot, child) in children.into_iter().enumerate() {
            if let Some(child) = child {
                self.dump_subtree(child, level + 1, out)?;
            }
            if let Some(key) = keys.get(slot) {
                out.push_str(&format!("{indent}  key {key:?}\n"));
            }
        }
        Ok(())
    }
}

fn format_ref(reference: Option<BlockIndex>) -> String {
    reference.map_or_else(|| "-".to_string(), |index| index.to_string())
}
