use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::common::types::{FrameId, PageId, PagePtr, Page, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

/// Per-frame metadata, guarded by the pool mutex. The page bytes themselves
/// live behind the frame's page latch.
struct Frame {
    page: PagePtr,
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            page: Arc::new(parking_lot::RwLock::new(Page::new(INVALID_PAGE_ID))),
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Fixed-capacity page cache over a disk manager.
///
/// A single coarse mutex guards the frame table, page table and free list;
/// the replacer keeps its own. Disk I/O happens inside the mutex section,
/// which costs throughput but keeps eviction atomic. The pool mutex is the
/// innermost lock in the system: it is never held while acquiring a page
/// latch.
pub struct BufferPoolManager {
    pool_size: usize,
    disk_manager: Arc<DiskManager>,
    replacer: LruReplacer,
    inner: Mutex<PoolInner>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Self::with_disk_manager(pool_size, disk_manager)
    }

    pub fn with_disk_manager(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Result<Self, BufferPoolError> {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        // Initially every frame is free.
        for frame_id in 0..pool_size {
            frames.push(Frame::new());
            free_list.push_back(frame_id);
        }

        Ok(Self {
            pool_size,
            disk_manager,
            replacer: LruReplacer::new(pool_size),
            inner: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
            }),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Fetch a page, reading it from disk if it is not resident. The caller
    /// owns one pin on the returned page and must `unpin_page` it.
    ///
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut inner = self.inner.lock();

        // Already resident: pin and return.
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &mut inner.frames[frame_id];
            frame.pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(frame.page.clone());
        }

        // Not resident: take a victim frame and load from disk.
        let frame_id = self.take_victim(&mut inner)?;
        let page = inner.frames[frame_id].page.clone();

        {
            let mut page_guard = page.write();
            if let Err(e) = self.disk_manager.read_page(page_id, &mut page_guard.data) {
                // Put the frame back so the pool stays consistent.
                page_guard.reset();
                drop(page_guard);
                inner.free_list.push_back(frame_id);
                return Err(e.into());
            }
            page_guard.page_id = page_id;
        }

        let frame = &mut inner.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok(page)
    }

    /// Drop one pin on a page, OR-ing in the caller's dirty hint.
    ///
    /// Returns `true` for a non-resident page (no-op) and `false` when the
    /// page is resident with no outstanding pins.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };

        let frame = &mut inner.frames[frame_id];
        // Never clear an already-set dirty flag.
        if is_dirty {
            frame.is_dirty = true;
        }

        if frame.pin_count == 0 {
            return false;
        }

        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Allocate a fresh page on disk and pin it in a frame, zero-filled.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut inner = self.inner.lock();

        let frame_id = self.take_victim(&mut inner)?;
        let page_id = match self.disk_manager.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                inner.free_list.push_back(frame_id);
                return Err(e.into());
            }
        };

        let page = inner.frames[frame_id].page.clone();
        {
            let mut page_guard = page.write();
            page_guard.data.fill(0);
            page_guard.page_id = page_id;
        }

        let frame = &mut inner.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok((page, page_id))
    }

    /// Drop a page from the pool and deallocate its disk id.
    ///
    /// Returns `true` if the page is gone (including the not-resident case)
    /// and `false` if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &inner.frames[frame_id];
        if frame.pin_count > 0 {
            return Ok(false);
        }

        if frame.is_dirty {
            let page_guard = frame.page.read();
            self.disk_manager.write_page(page_id, &page_guard.data)?;
        }
        self.disk_manager.deallocate_page(page_id);

        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);

        let frame = &mut inner.frames[frame_id];
        frame.page.write().reset();
        frame.page_id = INVALID_PAGE_ID;
        frame.pin_count = 0;
        frame.is_dirty = false;
        inner.free_list.push_back(frame_id);

        Ok(true)
    }

    /// Write a resident page's bytes back to disk and clear its dirty flag.
    /// Returns `false` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };

        {
            let frame = &inner.frames[frame_id];
            let page_guard = frame.page.read();
            self.disk_manager.write_page(page_id, &page_guard.data)?;
        }
        inner.frames[frame_id].is_dirty = false;
        Ok(true)
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();

        for frame_id in 0..self.pool_size {
            let page_id = inner.frames[frame_id].page_id;
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            {
                let frame = &inner.frames[frame_id];
                let page_guard = frame.page.read();
                self.disk_manager.write_page(page_id, &page_guard.data)?;
            }
            inner.frames[frame_id].is_dirty = false;
        }
        Ok(())
    }

    /// Frame accounting at a quiescent point:
    /// `(pinned frames, free frames, evictable frames)`. The three counts
    /// partition the pool.
    pub fn frame_counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        let pinned = inner.frames.iter().filter(|f| f.pin_count > 0).count();
        (pinned, inner.free_list.len(), self.replacer.size())
    }

    /// Pick a reusable frame: free list first, then LRU victim. The victim's
    /// old page is flushed if dirty and unmapped.
    fn take_victim(&self, inner: &mut PoolInner) -> Result<FrameId, BufferPoolError> {
        let frame_id = if let Some(frame_id) = inner.free_list.pop_front() {
            frame_id
        } else {
            self.replacer
                .victim()
                .ok_or(BufferPoolError::BufferPoolFull)?
        };

        let (old_page_id, old_dirty, page) = {
            let frame = &inner.frames[frame_id];
            (frame.page_id, frame.is_dirty, frame.page.clone())
        };

        if old_page_id != INVALID_PAGE_ID {
            if old_dirty {
                trace!("evicting dirty page {}, flushing", old_page_id);
                let page_guard = page.read();
                self.disk_manager.write_page(old_page_id, &page_guard.data)?;
            }
            inner.page_table.remove(&old_page_id);
            let frame = &mut inner.frames[frame_id];
            frame.page_id = INVALID_PAGE_ID;
            frame.is_dirty = false;
        }

        Ok(frame_id)
    }
}
