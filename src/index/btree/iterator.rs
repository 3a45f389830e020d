use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, PageReadGuard, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{LeafNode, Node};
use crate::index::btree::serialization::decode_node;
use crate::storage::buffer::BufferPoolManager;

struct LeafCursor<K> {
    page_id: PageId,
    // Held for the duration of the visit; dropped before the leaf is
    // unpinned when the cursor advances off it.
    guard: PageReadGuard,
    node: LeafNode<K>,
    index: usize,
}

/// Walks the leaf chain left to right. The current leaf stays read-latched
/// and pinned while the iterator sits on it; moving to the next leaf
/// releases the current one *before* latching its successor, so a writer
/// holding two siblings can never deadlock against a scan.
pub struct BTreeIterator<K> {
    buffer_pool: Arc<BufferPoolManager>,
    cursor: Option<LeafCursor<K>>,
}

impl<K> BTreeIterator<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    pub(crate) fn new(
        buffer_pool: Arc<BufferPoolManager>,
        page_id: PageId,
        guard: PageReadGuard,
        node: LeafNode<K>,
        index: usize,
    ) -> Self {
        Self {
            buffer_pool,
            cursor: Some(LeafCursor {
                page_id,
                guard,
                node,
                index,
            }),
        }
    }

    pub(crate) fn empty(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            cursor: None,
        }
    }

    fn release_cursor(&mut self) -> PageId {
        match self.cursor.take() {
            Some(cursor) => {
                let next = cursor.node.next_page_id;
                let page_id = cursor.page_id;
                drop(cursor.guard);
                self.buffer_pool.unpin_page(page_id, false);
                next
            }
            None => INVALID_PAGE_ID,
        }
    }
}

impl<K> Iterator for BTreeIterator<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    type Item = Result<(K, Rid), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cursor = self.cursor.as_mut()?;
            if cursor.index < cursor.node.entries.len() {
                let entry = cursor.node.entries[cursor.index].clone();
                cursor.index += 1;
                return Some(Ok(entry));
            }

            let next_page_id = self.release_cursor();
            if next_page_id == INVALID_PAGE_ID {
                return None;
            }

            let page = match self.buffer_pool.fetch_page(next_page_id) {
                Ok(page) => page,
                Err(e) => return Some(Err(e.into())),
            };
            let guard = page.read_arc();
            let node = match decode_node::<K>(&guard) {
                Ok(Node::Leaf(leaf)) => leaf,
                Ok(Node::Internal(_)) => {
                    drop(guard);
                    self.buffer_pool.unpin_page(next_page_id, false);
                    return Some(Err(BTreeError::InvalidNodeType(next_page_id)));
                }
                Err(e) => {
                    drop(guard);
                    self.buffer_pool.unpin_page(next_page_id, false);
                    return Some(Err(e));
                }
            };

            self.cursor = Some(LeafCursor {
                page_id: next_page_id,
                guard,
                node,
                index: 0,
            });
        }
    }
}

impl<K> Drop for BTreeIterator<K> {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            let page_id = cursor.page_id;
            drop(cursor.guard);
            self.buffer_pool.unpin_page(page_id, false);
        }
    }
}
