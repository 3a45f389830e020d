use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type; non-negative for real pages
pub type PageId = i32;

/// Sentinel for "no page"
pub const INVALID_PAGE_ID: PageId = -1;

/// Page id of the header page holding index name -> root page id records
pub const HEADER_PAGE_ID: PageId = 0;

/// Buffer pool frame ID type
pub type FrameId = usize;

/// Transaction ID type; lower id = older transaction
pub type TxnId = u32;

/// Catalog object ID type (tables, indexes)
pub type Oid = u32;

/// Record identifier: a tuple's physical address, stable for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    pub const INVALID: Rid = Rid {
        page_id: INVALID_PAGE_ID,
        slot_num: 0,
    };

    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_num)
    }
}

/// A page-sized byte frame plus the id of the page currently resident in it.
///
/// Pin counts and dirty flags live in the buffer pool's frame table; the
/// `RwLock` around this struct is the page latch, orthogonal to the pin.
#[derive(Debug)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
        self.page_id = INVALID_PAGE_ID;
    }
}

/// Smart pointer to a latched page
pub type PagePtr = Arc<RwLock<Page>>;

/// Owned read guard on a page latch; can outlive the stack frame that took it
pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, Page>;

/// Owned write guard on a page latch
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, Page>;
