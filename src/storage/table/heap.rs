use std::sync::Arc;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{table_page, PageError};
use crate::storage::table::{TableError, TableIterator};
use crate::storage::tuple::Tuple;
use crate::transaction::transaction::{TableWriteOp, TableWriteRecord, Transaction};

/// A heap of tuples for one table: a chain of slotted pages, addressed by
/// `Rid`. Mutations record their prior image into the owning transaction so
/// the transaction manager can replay them on abort.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create an empty heap with one fresh page.
    pub fn create(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, TableError> {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut guard = page.write();
            table_page::init(&mut guard, INVALID_PAGE_ID);
        }
        buffer_pool.unpin_page(page_id, true);

        Ok(Self {
            buffer_pool,
            first_page_id: page_id,
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Insert a tuple, appending to the first page with room and growing the
    /// chain when every page is full. Records an insert into `txn`.
    pub fn insert_tuple(
        self: &Arc<Self>,
        tuple: &Tuple,
        txn: &Transaction,
    ) -> Result<Rid, TableError> {
        let bytes = tuple.to_bytes()?;
        let mut page_id = self.first_page_id;

        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let mut guard = page.write();

            match table_page::insert_record(&mut guard, &bytes) {
                Ok(slot) => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, true);

                    let rid = Rid::new(page_id, slot);
                    txn.append_table_write(TableWriteRecord {
                        rid,
                        op: TableWriteOp::Insert,
                        heap: self.clone(),
                    });
                    return Ok(rid);
                }
                Err(PageError::InsufficientSpace) => {
                    let next = table_page::next_page_id(&guard);
                    if next != INVALID_PAGE_ID {
                        drop(guard);
                        self.buffer_pool.unpin_page(page_id, false);
                        page_id = next;
                        continue;
                    }

                    // Grow the chain. A tuple too large for an empty page is
                    // a hard error, not a reason to keep growing.
                    let (new_page, new_page_id) = self.buffer_pool.new_page()?;
                    {
                        let mut new_guard = new_page.write();
                        table_page::init(&mut new_guard, INVALID_PAGE_ID);
                        if let Err(e) = table_page::insert_record(&mut new_guard, &bytes) {
                            drop(new_guard);
                            self.buffer_pool.unpin_page(new_page_id, true);
                            drop(guard);
                            self.buffer_pool.unpin_page(page_id, false);
                            return Err(e.into());
                        }
                    }
                    table_page::set_next_page_id(&mut guard, new_page_id);
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, true);
                    self.buffer_pool.unpin_page(new_page_id, true);

                    let rid = Rid::new(new_page_id, 0);
                    txn.append_table_write(TableWriteRecord {
                        rid,
                        op: TableWriteOp::Insert,
                        heap: self.clone(),
                    });
                    return Ok(rid);
                }
                Err(e) => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    return Err(e.into());
                }
            }
        }
    }

    /// Overwrite the tuple at `rid`, recording its prior image into `txn`.
    pub fn update_tuple(
        self: &Arc<Self>,
        rid: Rid,
        tuple: &Tuple,
        txn: &Transaction,
    ) -> Result<(), TableError> {
        let old = self
            .get_tuple(rid)?
            .ok_or(TableError::TupleNotFound(rid))?;

        let bytes = tuple.to_bytes()?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            table_page::update_record(&mut guard, rid.slot_num, &bytes)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result?;

        txn.append_table_write(TableWriteRecord {
            rid,
            op: TableWriteOp::Update { old },
            heap: self.clone(),
        });
        Ok(())
    }

    /// Tombstone the tuple at `rid`, recording its prior image into `txn`.
    /// The delete becomes permanent at commit (`apply_delete`).
    pub fn mark_delete(self: &Arc<Self>, rid: Rid, txn: &Transaction) -> Result<(), TableError> {
        let old = self
            .get_tuple(rid)?
            .ok_or(TableError::TupleNotFound(rid))?;

        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            table_page::mark_delete(&mut guard, rid.slot_num)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result?;

        txn.append_table_write(TableWriteRecord {
            rid,
            op: TableWriteOp::Delete { old },
            heap: self.clone(),
        });
        Ok(())
    }

    /// Read the live tuple at `rid`, `None` when tombstoned or vacated.
    pub fn get_tuple(&self, rid: Rid) -> Result<Option<Tuple>, TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let guard = page.read();
            match table_page::get_record(&guard, rid.slot_num) {
                Ok(Some(bytes)) => Tuple::from_bytes(bytes).map(Some).map_err(TableError::from),
                Ok(None) => Ok(None),
                Err(e) => Err(e.into()),
            }
        };
        self.buffer_pool.unpin_page(rid.page_id, false);
        result
    }

    /// Make a tombstoned delete permanent. Used at commit and when rolling
    /// back an insert.
    pub(crate) fn apply_delete(&self, rid: Rid) -> Result<(), TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            table_page::apply_delete(&mut guard, rid.slot_num)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result.map_err(Into::into)
    }

    /// Clear a tombstone during abort.
    pub(crate) fn rollback_delete(&self, rid: Rid) -> Result<(), TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            table_page::rollback_delete(&mut guard, rid.slot_num)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result.map_err(Into::into)
    }

    /// Put a prior image back during abort, without recording anything.
    pub(crate) fn restore_tuple(&self, rid: Rid, tuple: &Tuple) -> Result<(), TableError> {
        let bytes = tuple.to_bytes()?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            table_page::update_record(&mut guard, rid.slot_num, &bytes)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result.map_err(Into::into)
    }

    /// Forward iterator over live tuples. Holds no latch between calls.
    pub fn iter(&self) -> TableIterator {
        TableIterator::new(self.buffer_pool.clone(), self.first_page_id)
    }
}
