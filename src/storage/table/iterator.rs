use std::sync::Arc;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::table_page;
use crate::storage::table::TableError;
use crate::storage::tuple::Tuple;

/// Walks a table heap page chain front to back, skipping dead slots.
///
/// Each `next` pins exactly the page it reads and unpins it before
/// returning, so no buffer resource is held across calls.
pub struct TableIterator {
    buffer_pool: Arc<BufferPoolManager>,
    current_page_id: PageId,
    next_slot: u32,
}

impl TableIterator {
    pub(crate) fn new(buffer_pool: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self {
            buffer_pool,
            current_page_id: first_page_id,
            next_slot: 0,
        }
    }
}

impl Iterator for TableIterator {
    type Item = Result<(Rid, Tuple), TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_page_id == INVALID_PAGE_ID {
                return None;
            }

            let page_id = self.current_page_id;
            let page = match self.buffer_pool.fetch_page(page_id) {
                Ok(page) => page,
                Err(e) => {
                    self.current_page_id = INVALID_PAGE_ID;
                    return Some(Err(e.into()));
                }
            };

            let guard = page.read();
            let count = table_page::record_count(&guard);

            while self.next_slot < count {
                let slot = self.next_slot;
                self.next_slot += 1;

                match table_page::get_record(&guard, slot) {
                    Ok(Some(bytes)) => {
                        let item = Tuple::from_bytes(bytes)
                            .map(|tuple| (Rid::new(page_id, slot), tuple))
                            .map_err(TableError::from);
                        drop(guard);
                        self.buffer_pool.unpin_page(page_id, false);
                        return Some(item);
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        drop(guard);
                        self.buffer_pool.unpin_page(page_id, false);
                        self.current_page_id = INVALID_PAGE_ID;
                        return Some(Err(e.into()));
                    }
                }
            }

            let next = table_page::next_page_id(&guard);
            drop(guard);
            self.buffer_pool.unpin_page(page_id, false);
            self.current_page_id = next;
            self.next_slot = 0;
        }
    }
}
