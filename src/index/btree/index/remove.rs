use serde::de::DeserializeOwned;
use serde::Serialize;

use super::base::{BTreeIndex, WriteCrab, WriteOp};
use crate::common::types::{PageId, PageWriteGuard, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{InternalNode, Node};
use crate::index::btree::serialization::{
    decode_node, encode_internal, encode_leaf, encode_node, write_parent_pointer,
};

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    /// Delete `key` if present. Underflowing nodes borrow from a sibling
    /// when the pair can spare an entry, and merge otherwise; merges can
    /// propagate to the root and shrink the tree.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let Some((mut crab, leaf_id, mut leaf_guard, mut leaf)) =
            self.find_leaf_write(key, WriteOp::Delete)?
        else {
            return Ok(());
        };

        if !leaf.remove(key) {
            drop(leaf_guard);
            self.buffer_pool.unpin_page(leaf_id, false);
            crab.release_ancestors(&self.buffer_pool);
            return Ok(());
        }

        if crab.is_root(leaf_id) {
            return self.adjust_root(crab, leaf_id, leaf_guard, Node::Leaf(leaf));
        }

        if leaf.size() >= leaf.min_size() {
            encode_leaf(&leaf, &mut leaf_guard)?;
            drop(leaf_guard);
            self.buffer_pool.unpin_page(leaf_id, true);
            crab.release_ancestors(&self.buffer_pool);
            return Ok(());
        }

        self.coalesce_or_redistribute(crab, leaf_id, leaf_guard, Node::Leaf(leaf))
    }

    /// Fix an underflowing non-root node, recursing up the held ancestor
    /// chain while merges empty the parents below their minimum.
    fn coalesce_or_redistribute(
        &self,
        mut crab: WriteCrab<'_>,
        node_id: PageId,
        node_guard: PageWriteGuard,
        node: Node<K>,
    ) -> Result<(), BTreeError> {
        let mut target = (node_id, node_guard, node);

        loop {
            let (node_id, mut node_guard, mut node) = target;

            let (parent_id, mut parent_guard) = crab
                .path
                .pop()
                .expect("underflowing non-root node must have a latched parent");
            let mut parent = match decode_node::<K>(&parent_guard)? {
                Node::Internal(internal) => internal,
                Node::Leaf(_) => return Err(BTreeError::InvalidNodeType(parent_id)),
            };

            let index = parent
                .value_index(node_id)
                .expect("underflowing node must be linked from its parent");
            let neighbor_index = if index == 0 { 1 } else { index - 1 };
            let neighbor_id = parent.child_at(neighbor_index);

            let neighbor_page = self.buffer_pool.fetch_page(neighbor_id)?;
            let mut neighbor_guard = neighbor_page.write_arc();
            let mut neighbor = decode_node::<K>(&neighbor_guard)?;

            if neighbor.size() + node.size() > node.max_size() {
                // Redistribution never changes the parent's fanout, so the
                // repair stops here.
                self.redistribute(&mut parent, &mut node, &mut neighbor, index)?;
                encode_node(&node, &mut node_guard)?;
                drop(node_guard);
                self.buffer_pool.unpin_page(node_id, true);
                encode_node(&neighbor, &mut neighbor_guard)?;
                drop(neighbor_guard);
                self.buffer_pool.unpin_page(neighbor_id, true);
                encode_internal(&parent, &mut parent_guard)?;
                drop(parent_guard);
                self.buffer_pool.unpin_page(parent_id, true);
                crab.release_ancestors(&self.buffer_pool);
                return Ok(());
            }

            // Merge the right node of the pair into the left to preserve key
            // order, then drop the separator from the parent.
            if index == 0 {
                // Neighbor is the right sibling; it merges into `node`.
                self.merge_right_into_left(&mut node, &mut neighbor, &parent, 1)?;
                parent.remove_at(1);
                encode_node(&node, &mut node_guard)?;
                drop(node_guard);
                self.buffer_pool.unpin_page(node_id, true);
                drop(neighbor_guard);
                self.buffer_pool.unpin_page(neighbor_id, false);
                self.buffer_pool.delete_page(neighbor_id)?;
            } else {
                // Neighbor is the left sibling; `node` merges into it.
                self.merge_right_into_left(&mut neighbor, &mut node, &parent, index)?;
                parent.remove_at(index);
                encode_node(&neighbor, &mut neighbor_guard)?;
                drop(neighbor_guard);
                self.buffer_pool.unpin_page(neighbor_id, true);
                drop(node_guard);
                self.buffer_pool.unpin_page(node_id, false);
                self.buffer_pool.delete_page(node_id)?;
            }

            if crab.is_root(parent_id) {
                return self.adjust_root(crab, parent_id, parent_guard, Node::Internal(parent));
            }

            if parent.size() >= parent.min_size() {
                encode_internal(&parent, &mut parent_guard)?;
                drop(parent_guard);
                self.buffer_pool.unpin_page(parent_id, true);
                crab.release_ancestors(&self.buffer_pool);
                return Ok(());
            }

            target = (parent_id, parent_guard, Node::Internal(parent));
        }
    }

    /// Move one entry from `neighbor` into `node` and refresh the parent's
    /// separator. `index` is the node's slot in the parent; slot 0 means the
    /// neighbor is the right sibling.
    fn redistribute(
        &self,
        parent: &mut InternalNode<K>,
        node: &mut Node<K>,
        neighbor: &mut Node<K>,
        index: usize,
    ) -> Result<(), BTreeError> {
        match (node, neighbor) {
            (Node::Leaf(node), Node::Leaf(neighbor)) => {
                if index == 0 {
                    // Move the right sibling's first pair to our end.
                    let pair = neighbor.entries.remove(0);
                    node.entries.push(pair);
                    parent.set_key_at(1, neighbor.entries[0].0.clone());
                } else {
                    // Move the left sibling's last pair to our front.
                    let pair = neighbor
                        .entries
                        .pop()
                        .expect("redistribution source cannot be empty");
                    parent.set_key_at(index, pair.0.clone());
                    node.entries.insert(0, pair);
                }
                Ok(())
            }
            (Node::Internal(node), Node::Internal(neighbor)) => {
                if index == 0 {
                    // The separator comes down onto the moved child; the
                    // neighbor's next dummy key goes up in its place.
                    let separator = parent.key_at(1).clone();
                    let (_, child) = neighbor.entries.remove(0);
                    node.entries.push((separator, child));
                    self.adopt_child(child, node.page_id)?;
                    parent.set_key_at(1, neighbor.entries[0].0.clone());
                } else {
                    let separator = parent.key_at(index).clone();
                    let (key, child) = neighbor
                        .entries
                        .pop()
                        .expect("redistribution source cannot be empty");
                    node.set_key_at(0, separator);
                    node.entries.insert(0, (key.clone(), child));
                    self.adopt_child(child, node.page_id)?;
                    parent.set_key_at(index, key);
                }
                Ok(())
            }
            _ => Err(BTreeError::InvalidNodeType(parent.page_id)),
        }
    }

    /// Append all of `right`'s entries onto `left`. `separator_slot` is the
    /// parent slot whose key separates the two nodes.
    fn merge_right_into_left(
        &self,
        left: &mut Node<K>,
        right: &mut Node<K>,
        parent: &InternalNode<K>,
        separator_slot: usize,
    ) -> Result<(), BTreeError> {
        match (left, right) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                left.entries.append(&mut right.entries);
                left.next_page_id = right.next_page_id;
                Ok(())
            }
            (Node::Internal(left), Node::Internal(right)) => {
                // The separator becomes the real key over the right node's
                // first child.
                right.set_key_at(0, parent.key_at(separator_slot).clone());
                for (_, child_id) in &right.entries {
                    self.adopt_child(*child_id, left.page_id)?;
                }
                left.entries.append(&mut right.entries);
                Ok(())
            }
            _ => Err(BTreeError::InvalidNodeType(parent.page_id)),
        }
    }

    /// The root shrank: promote a lone child, or mark the tree empty when
    /// the last entry of a root leaf went away.
    fn adjust_root(
        &self,
        mut crab: WriteCrab<'_>,
        root_id: PageId,
        mut root_node_guard: PageWriteGuard,
        node: Node<K>,
    ) -> Result<(), BTreeError> {
        match node {
            Node::Leaf(leaf) if leaf.size() == 0 => {
                let mut root_guard = crab
                    .root_guard
                    .take()
                    .expect("root latch must be held when the tree empties");
                *root_guard = INVALID_PAGE_ID;
                self.update_root_record(INVALID_PAGE_ID)?;
                drop(root_node_guard);
                self.buffer_pool.unpin_page(root_id, false);
                self.buffer_pool.delete_page(root_id)?;
                Ok(())
            }
            Node::Internal(internal) if internal.size() == 1 => {
                let child_id = internal.child_at(0);
                let mut root_guard = crab
                    .root_guard
                    .take()
                    .expect("root latch must be held when the root collapses");
                *root_guard = child_id;
                self.update_root_record(child_id)?;

                let child_page = self.buffer_pool.fetch_page(child_id)?;
                {
                    let mut guard = child_page.write();
                    write_parent_pointer(&mut guard, INVALID_PAGE_ID);
                }
                self.buffer_pool.unpin_page(child_id, true);

                drop(root_node_guard);
                self.buffer_pool.unpin_page(root_id, false);
                self.buffer_pool.delete_page(root_id)?;
                Ok(())
            }
            node => {
                encode_node(&node, &mut root_node_guard)?;
                drop(root_node_guard);
                self.buffer_pool.unpin_page(root_id, true);
                crab.release_ancestors(&self.buffer_pool);
                Ok(())
            }
        }
    }
}
