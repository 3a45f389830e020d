use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{
    PageId, PageReadGuard, PageWriteGuard, Rid, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{LeafNode, Node};
use crate::index::btree::serialization::{decode_node, write_parent_pointer};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::header;

/// A latch-crabbed B+ tree over the buffer pool.
///
/// Every inter-node reference is a page id resolved through the buffer pool;
/// nodes never own each other. The root id lives behind its own mutex and is
/// mirrored into the header page so the tree survives reopening.
pub struct BTreeIndex<K> {
    pub(crate) name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root: Mutex<PageId>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _phantom: PhantomData<K>,
}

/// Which structural operation a write descent is protecting against; decides
/// the node-safety predicate.
#[derive(Clone, Copy)]
pub(crate) enum WriteOp {
    Insert,
    Delete,
}

/// The latches a write descent currently holds: the root id mutex (until a
/// safe node is found) and the write-latched, still-pinned ancestor chain in
/// descent order.
pub(crate) struct WriteCrab<'a> {
    pub root_guard: Option<MutexGuard<'a, PageId>>,
    pub root_id_at_entry: PageId,
    pub path: Vec<(PageId, PageWriteGuard)>,
}

impl WriteCrab<'_> {
    /// Page ids are never recycled, so matching the entry root id identifies
    /// the root for the lifetime of this descent.
    pub fn is_root(&self, page_id: PageId) -> bool {
        page_id == self.root_id_at_entry
    }

    /// Drop every ancestor latch (they were not modified) and the root id
    /// mutex. Called the moment a safe node is latched.
    pub fn release_ancestors(&mut self, buffer_pool: &BufferPoolManager) {
        self.root_guard = None;
        for (page_id, guard) in self.path.drain(..) {
            drop(guard);
            buffer_pool.unpin_page(page_id, false);
        }
    }
}

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    /// Open (or register) the named index. The root id is recovered from the
    /// header page when the name is already recorded there.
    pub fn new(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(leaf_max_size >= 3, "leaf_max_size must be at least 3");
        assert!(
            internal_max_size >= 3,
            "internal_max_size must be at least 3"
        );
        let name = name.into();

        let header_page = buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let root_page_id = {
            let mut guard = header_page.write();
            match header::get_record(&guard, &name) {
                Some(root) => root,
                None => {
                    header::insert_record(&mut guard, &name, INVALID_PAGE_ID)?;
                    INVALID_PAGE_ID
                }
            }
        };
        buffer_pool.unpin_page(HEADER_PAGE_ID, true);

        Ok(Self {
            name,
            buffer_pool,
            root: Mutex::new(root_page_id),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        *self.root.lock() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root.lock()
    }

    /// Point lookup with read crabbing: latch child, then release parent.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let Some((leaf_id, guard, leaf)) = self.find_leaf_read(Some(key))? else {
            return Ok(None);
        };
        let result = leaf.lookup(key);
        drop(guard);
        self.buffer_pool.unpin_page(leaf_id, false);
        Ok(result)
    }

    /// Read-crab to a leaf: the one containing `key`, or the leftmost leaf
    /// when `key` is `None`. Returns the still-latched, still-pinned leaf.
    pub(crate) fn find_leaf_read(
        &self,
        key: Option<&K>,
    ) -> Result<Option<(PageId, PageReadGuard, LeafNode<K>)>, BTreeError> {
        let root_guard = self.root.lock();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let page = self.buffer_pool.fetch_page(root_id)?;
        let mut guard = page.read_arc();
        drop(root_guard);
        let mut page_id = root_id;

        loop {
            match decode_node::<K>(&guard)? {
                Node::Internal(internal) => {
                    let child_id = match key {
                        Some(key) => internal.lookup(key),
                        None => internal.child_at(0),
                    };
                    let child_page = self.buffer_pool.fetch_page(child_id)?;
                    let child_guard = child_page.read_arc();
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    guard = child_guard;
                    page_id = child_id;
                }
                Node::Leaf(leaf) => return Ok(Some((page_id, guard, leaf))),
            }
        }
    }

    /// Write-crab to the leaf for `key`, holding the root id mutex and every
    /// unsafe ancestor's write latch. Returns `None` on an empty tree.
    pub(crate) fn find_leaf_write(
        &self,
        key: &K,
        op: WriteOp,
    ) -> Result<Option<(WriteCrab<'_>, PageId, PageWriteGuard, LeafNode<K>)>, BTreeError> {
        let root_guard = self.root.lock();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut crab = WriteCrab {
            root_guard: Some(root_guard),
            root_id_at_entry: root_id,
            path: Vec::new(),
        };
        let mut page_id = root_id;

        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let guard = page.write_arc();
            let node = decode_node::<K>(&guard)?;

            let safe = match op {
                WriteOp::Insert => node.is_insert_safe(crab.is_root(page_id)),
                WriteOp::Delete => node.is_delete_safe(crab.is_root(page_id)),
            };
            if safe {
                crab.release_ancestors(&self.buffer_pool);
            }

            match node {
                Node::Internal(internal) => {
                    let child_id = internal.lookup(key);
                    crab.path.push((page_id, guard));
                    page_id = child_id;
                }
                Node::Leaf(leaf) => return Ok(Some((crab, page_id, guard, leaf))),
            }
        }
    }

    /// Walk the whole tree and verify its structural invariants: keys
    /// strictly ascending within and across nodes, sizes within bounds for
    /// non-root nodes, parent pointers consistent, and all leaves at the
    /// same depth. Concurrent writers are held off at the root for the
    /// duration.
    pub fn check_integrity(&self) -> Result<(), String> {
        let root_guard = self.root.lock();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut leaf_depth: Option<usize> = None;
        // (page id, expected parent, depth)
        let mut pending = vec![(root_id, INVALID_PAGE_ID, 0usize)];

        while let Some((page_id, expected_parent, depth)) = pending.pop() {
            let page = self
                .buffer_pool
                .fetch_page(page_id)
                .map_err(|e| e.to_string())?;
            let node = {
                let guard = page.read();
                decode_node::<K>(&guard).map_err(|e| e.to_string())
            };
            self.buffer_pool.unpin_page(page_id, false);
            let node = node?;

            let is_root = page_id == root_id;
            match node {
                Node::Leaf(leaf) => {
                    if leaf.parent_page_id != expected_parent {
                        return Err(format!("leaf {} has wrong parent", page_id));
                    }
                    if !leaf.entries.windows(2).all(|w| w[0].0 < w[1].0) {
                        return Err(format!("leaf {} keys not strictly ascending", page_id));
                    }
                    if !is_root
                        && (leaf.size() < leaf.min_size() || leaf.size() >= leaf.max_size)
                    {
                        return Err(format!("leaf {} size {} out of bounds", page_id, leaf.size()));
                    }
                    match leaf_depth {
                        Some(expected) if expected != depth => {
                            return Err(format!("leaf {} at depth {} != {}", page_id, depth, expected));
                        }
                        None => leaf_depth = Some(depth),
                        _ => {}
                    }
                }
                Node::Internal(internal) => {
                    if internal.parent_page_id != expected_parent {
                        return Err(format!("internal {} has wrong parent", page_id));
                    }
                    if !internal.entries[1..].windows(2).all(|w| w[0].0 < w[1].0) {
                        return Err(format!(
                            "internal {} separators not strictly ascending",
                            page_id
                        ));
                    }
                    if !is_root
                        && (internal.size() < internal.min_size()
                            || internal.size() > internal.max_size)
                    {
                        return Err(format!(
                            "internal {} size {} out of bounds",
                            page_id,
                            internal.size()
                        ));
                    }
                    if is_root && internal.size() < 2 {
                        return Err(format!("root internal {} has fewer than 2 children", page_id));
                    }
                    for (_, child) in &internal.entries {
                        pending.push((*child, page_id, depth + 1));
                    }
                }
            }
        }

        Ok(())
    }

    /// Persist a root change into the header page. Callers hold the root id
    /// mutex while this runs.
    pub(crate) fn update_root_record(&self, root_page_id: PageId) -> Result<(), BTreeError> {
        let header_page = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        {
            let mut guard = header_page.write();
            if !header::update_record(&mut guard, &self.name, root_page_id)? {
                header::insert_record(&mut guard, &self.name, root_page_id)?;
            }
        }
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true);
        Ok(())
    }

    /// Point a child page's parent pointer at its new home.
    pub(crate) fn adopt_child(&self, child_id: PageId, parent_id: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(child_id)?;
        {
            let mut guard = page.write();
            write_parent_pointer(&mut guard, parent_id);
        }
        self.buffer_pool.unpin_page(child_id, true);
        Ok(())
    }
}
