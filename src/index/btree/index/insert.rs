use serde::de::DeserializeOwned;
use serde::Serialize;

use super::base::{BTreeIndex, WriteCrab, WriteOp};
use crate::common::types::{PageId, PagePtr, PageWriteGuard, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{InternalNode, LeafNode, Node};
use crate::index::btree::serialization::{decode_node, encode_internal, encode_leaf, encode_node};

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    /// Insert a key/rid pair. Returns `false` and leaves the tree unchanged
    /// when the key is already present (unique index).
    pub fn insert(&self, key: K, rid: Rid) -> Result<bool, BTreeError> {
        loop {
            {
                let mut root_guard = self.root.lock();
                if *root_guard == INVALID_PAGE_ID {
                    let (page, page_id) = self.buffer_pool.new_page()?;
                    let mut leaf = LeafNode::new(page_id, INVALID_PAGE_ID, self.leaf_max_size);
                    leaf.insert(key, rid);
                    {
                        let mut guard = page.write();
                        encode_leaf(&leaf, &mut guard)?;
                    }
                    self.buffer_pool.unpin_page(page_id, true);
                    *root_guard = page_id;
                    self.update_root_record(page_id)?;
                    return Ok(true);
                }
            }

            // Tree was non-empty a moment ago; it may have been emptied by a
            // concurrent delete before we re-latched, in which case retry.
            if let Some((crab, leaf_id, guard, leaf)) =
                self.find_leaf_write(&key, WriteOp::Insert)?
            {
                return self.insert_into_leaf(crab, leaf_id, guard, leaf, key, rid);
            }
        }
    }

    fn insert_into_leaf(
        &self,
        mut crab: WriteCrab<'_>,
        leaf_id: PageId,
        mut leaf_guard: PageWriteGuard,
        mut leaf: LeafNode<K>,
        key: K,
        rid: Rid,
    ) -> Result<bool, BTreeError> {
        if leaf.lookup(&key).is_some() {
            drop(leaf_guard);
            self.buffer_pool.unpin_page(leaf_id, false);
            crab.release_ancestors(&self.buffer_pool);
            return Ok(false);
        }

        let new_size = leaf.insert(key, rid);
        if new_size < leaf.max_size {
            encode_leaf(&leaf, &mut leaf_guard)?;
            drop(leaf_guard);
            self.buffer_pool.unpin_page(leaf_id, true);
            crab.release_ancestors(&self.buffer_pool);
            return Ok(true);
        }

        // Leaf overflow: move the upper half to a fresh right sibling and
        // push the sibling's first key into the parent.
        let upper = leaf.split_off_upper();
        let (new_page, new_page_id) = self.buffer_pool.new_page()?;
        let new_leaf = LeafNode {
            page_id: new_page_id,
            parent_page_id: leaf.parent_page_id,
            next_page_id: leaf.next_page_id,
            max_size: leaf.max_size,
            entries: upper,
        };
        leaf.next_page_id = new_page_id;
        let separator = new_leaf.entries[0].0.clone();

        self.insert_into_parent(
            &mut crab,
            leaf_id,
            leaf_guard,
            Node::Leaf(leaf),
            separator,
            new_page_id,
            new_page,
            Node::Leaf(new_leaf),
        )?;
        crab.release_ancestors(&self.buffer_pool);
        Ok(true)
    }

    /// Link a freshly split `(left, right)` pair under their parent, splitting
    /// upward while the parent overflows. Writes back both halves at each
    /// level; every touched node is still write-latched by this descent.
    #[allow(clippy::too_many_arguments)]
    fn insert_into_parent(
        &self,
        crab: &mut WriteCrab<'_>,
        mut left_id: PageId,
        mut left_guard: PageWriteGuard,
        mut left: Node<K>,
        mut separator: K,
        mut right_id: PageId,
        mut right_page: PagePtr,
        mut right: Node<K>,
    ) -> Result<(), BTreeError> {
        loop {
            if crab.path.is_empty() {
                // `left` was the root; grow the tree by one level.
                let (root_page, root_page_id) = self.buffer_pool.new_page()?;
                let root_node = InternalNode::new_root(
                    root_page_id,
                    separator,
                    left_id,
                    right_id,
                    self.internal_max_size,
                );
                left.set_parent(root_page_id);
                right.set_parent(root_page_id);

                encode_node(&left, &mut left_guard)?;
                drop(left_guard);
                self.buffer_pool.unpin_page(left_id, true);

                {
                    let mut guard = right_page.write();
                    encode_node(&right, &mut guard)?;
                }
                self.buffer_pool.unpin_page(right_id, true);

                {
                    let mut guard = root_page.write();
                    encode_internal(&root_node, &mut guard)?;
                }
                self.buffer_pool.unpin_page(root_page_id, true);

                let mut root_guard = crab
                    .root_guard
                    .take()
                    .expect("root latch must be held when the root splits");
                *root_guard = root_page_id;
                self.update_root_record(root_page_id)?;
                return Ok(());
            }

            let (parent_id, mut parent_guard) = crab
                .path
                .pop()
                .expect("unsafe ancestor chain cannot be empty here");
            let mut parent = match decode_node::<K>(&parent_guard)? {
                Node::Internal(node) => node,
                Node::Leaf(_) => return Err(BTreeError::InvalidNodeType(parent_id)),
            };

            right.set_parent(parent_id);
            encode_node(&left, &mut left_guard)?;
            drop(left_guard);
            self.buffer_pool.unpin_page(left_id, true);
            {
                let mut guard = right_page.write();
                encode_node(&right, &mut guard)?;
            }
            self.buffer_pool.unpin_page(right_id, true);

            let new_size = parent.insert_after(left_id, separator, right_id);
            if new_size <= self.internal_max_size {
                encode_internal(&parent, &mut parent_guard)?;
                drop(parent_guard);
                self.buffer_pool.unpin_page(parent_id, true);
                return Ok(());
            }

            // Parent overflow: split it and carry the new pair upward. The
            // children moving to the new sibling must be re-homed.
            let upper = parent.split_off_upper();
            let (new_page, new_page_id) = self.buffer_pool.new_page()?;
            let new_internal = InternalNode {
                page_id: new_page_id,
                parent_page_id: parent.parent_page_id,
                max_size: parent.max_size,
                entries: upper,
            };
            for (_, child_id) in &new_internal.entries {
                self.adopt_child(*child_id, new_page_id)?;
            }
            let new_separator = new_internal.entries[0].0.clone();

            left_id = parent_id;
            left_guard = parent_guard;
            left = Node::Internal(parent);
            separator = new_separator;
            right_id = new_page_id;
            right_page = new_page;
            right = Node::Internal(new_internal);
        }
    }
}
