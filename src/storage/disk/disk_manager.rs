use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::trace;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager handles page-granular I/O against a single database file.
///
/// Page ids map directly to file offsets (`page_id * PAGE_SIZE`). Page 0 is
/// allocated eagerly at creation and reserved for the header page.
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    /// Open (or create) the database file at the given path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let manager = Self {
            db_file: Mutex::new(file),
        };

        // Reserve page 0 (header page) on a fresh database file.
        {
            let mut file = manager.db_file.lock();
            if file.metadata()?.len() == 0 {
                let zeros = [0u8; PAGE_SIZE];
                file.write_all(&zeros)?;
                file.flush()?;
            }
        }

        Ok(manager)
    }

    /// Read a page from disk into `buf`. Reads past the end of the file yield
    /// a zeroed page so that freshly allocated pages are always readable.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();

        let file_size = file.metadata()?.len();
        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Write a page's bytes to disk.
    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    /// Allocate a new page id by extending the file with a zeroed page.
    pub fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        let mut file = self.db_file.lock();

        let file_size = file.metadata()?.len();
        let new_page_id = (file_size / PAGE_SIZE as u64) as PageId;

        file.seek(SeekFrom::End(0))?;
        let zeros = [0u8; PAGE_SIZE];
        file.write_all(&zeros)?;
        file.flush()?;

        trace!("allocated page {}", new_page_id);
        Ok(new_page_id)
    }

    /// Release a page id. Space is not reclaimed; the slot simply becomes
    /// unreachable until a compaction pass that this engine does not have.
    pub fn deallocate_page(&self, page_id: PageId) {
        trace!("deallocated page {}", page_id);
    }
}
