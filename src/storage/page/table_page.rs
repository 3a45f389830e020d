use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::error::PageError;

// Table page layout (slotted):
// - next_page_id: i32 (4 bytes)
// - free_space_offset: u32 (4 bytes) — record data grows forward from here
// - record_count: u32 (4 bytes)
// - record data, starting at HEADER_SIZE
// - slot array, growing backward from the page end; one entry per record:
//   offset: u32 | length: u32
//
// The high bit of the length word is a tombstone: the record is marked
// deleted but restorable until the owning transaction commits.

const HEADER_SIZE: usize = 12;
const SLOT_SIZE: usize = 8;
const TOMBSTONE_FLAG: u32 = 1 << 31;

pub fn init(page: &mut Page, next_page_id: PageId) {
    page.data[..HEADER_SIZE].fill(0);
    LittleEndian::write_i32(&mut page.data[0..4], next_page_id);
    LittleEndian::write_u32(&mut page.data[4..8], HEADER_SIZE as u32);
    LittleEndian::write_u32(&mut page.data[8..12], 0);
}

pub fn next_page_id(page: &Page) -> PageId {
    LittleEndian::read_i32(&page.data[0..4])
}

pub fn set_next_page_id(page: &mut Page, next_page_id: PageId) {
    LittleEndian::write_i32(&mut page.data[0..4], next_page_id);
}

pub fn record_count(page: &Page) -> u32 {
    LittleEndian::read_u32(&page.data[8..12])
}

fn free_space_offset(page: &Page) -> u32 {
    LittleEndian::read_u32(&page.data[4..8])
}

fn slot_pos(slot: u32) -> usize {
    PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
}

fn read_slot(page: &Page, slot: u32) -> (u32, u32) {
    let pos = slot_pos(slot);
    let offset = LittleEndian::read_u32(&page.data[pos..pos + 4]);
    let length = LittleEndian::read_u32(&page.data[pos + 4..pos + 8]);
    (offset, length)
}

fn write_slot(page: &mut Page, slot: u32, offset: u32, length: u32) {
    let pos = slot_pos(slot);
    LittleEndian::write_u32(&mut page.data[pos..pos + 4], offset);
    LittleEndian::write_u32(&mut page.data[pos + 4..pos + 8], length);
}

/// Append a record; returns its slot number.
pub fn insert_record(page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
    let count = record_count(page);
    let data_start = free_space_offset(page) as usize;
    let slot_array_start = slot_pos(count);

    // New record plus its slot entry must fit between the data area and the
    // slot array.
    if data_start + data.len() + SLOT_SIZE > slot_array_start {
        return Err(PageError::InsufficientSpace);
    }

    page.data[data_start..data_start + data.len()].copy_from_slice(data);
    write_slot(page, count, data_start as u32, data.len() as u32);

    LittleEndian::write_u32(&mut page.data[4..8], (data_start + data.len()) as u32);
    LittleEndian::write_u32(&mut page.data[8..12], count + 1);
    Ok(count)
}

/// Read a live record. `None` for tombstoned or vacated slots.
pub fn get_record(page: &Page, slot: u32) -> Result<Option<&[u8]>, PageError> {
    if slot >= record_count(page) {
        return Err(PageError::InvalidSlot(slot));
    }
    let (offset, length) = read_slot(page, slot);
    if length == 0 || length & TOMBSTONE_FLAG != 0 {
        return Ok(None);
    }
    Ok(Some(&page.data[offset as usize..offset as usize + length as usize]))
}

/// Overwrite a live record in place, relocating it to fresh space when it
/// grows. Leaked space is reclaimed only by a rewrite of the whole page,
/// which this engine does not do.
pub fn update_record(page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
    if slot >= record_count(page) {
        return Err(PageError::InvalidSlot(slot));
    }
    let (offset, length) = read_slot(page, slot);
    if length == 0 || length & TOMBSTONE_FLAG != 0 {
        return Err(PageError::RecordNotFound);
    }

    if data.len() <= length as usize {
        let offset = offset as usize;
        page.data[offset..offset + data.len()].copy_from_slice(data);
        write_slot(page, slot, offset as u32, data.len() as u32);
        return Ok(());
    }

    let data_start = free_space_offset(page) as usize;
    let slot_array_start = slot_pos(record_count(page) - 1);
    if data_start + data.len() > slot_array_start {
        return Err(PageError::InsufficientSpace);
    }

    page.data[data_start..data_start + data.len()].copy_from_slice(data);
    write_slot(page, slot, data_start as u32, data.len() as u32);
    LittleEndian::write_u32(&mut page.data[4..8], (data_start + data.len()) as u32);
    Ok(())
}

/// Tombstone a record; reversible via `rollback_delete`.
pub fn mark_delete(page: &mut Page, slot: u32) -> Result<(), PageError> {
    if slot >= record_count(page) {
        return Err(PageError::InvalidSlot(slot));
    }
    let (offset, length) = read_slot(page, slot);
    if length == 0 || length & TOMBSTONE_FLAG != 0 {
        return Err(PageError::RecordNotFound);
    }
    write_slot(page, slot, offset, length | TOMBSTONE_FLAG);
    Ok(())
}

/// Clear a tombstone set by `mark_delete`.
pub fn rollback_delete(page: &mut Page, slot: u32) -> Result<(), PageError> {
    if slot >= record_count(page) {
        return Err(PageError::InvalidSlot(slot));
    }
    let (offset, length) = read_slot(page, slot);
    write_slot(page, slot, offset, length & !TOMBSTONE_FLAG);
    Ok(())
}

/// Permanently vacate a slot. The slot number is never reused, keeping
/// record ids stable.
pub fn apply_delete(page: &mut Page, slot: u32) -> Result<(), PageError> {
    if slot >= record_count(page) {
        return Err(PageError::InvalidSlot(slot));
    }
    write_slot(page, slot, 0, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::INVALID_PAGE_ID;

    #[test]
    fn test_insert_and_get() {
        let mut page = Page::new(1);
        init(&mut page, INVALID_PAGE_ID);

        let a = insert_record(&mut page, b"alpha").unwrap();
        let b = insert_record(&mut page, b"beta").unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(get_record(&page, 0).unwrap(), Some(&b"alpha"[..]));
        assert_eq!(get_record(&page, 1).unwrap(), Some(&b"beta"[..]));
        assert!(get_record(&page, 2).is_err());
    }

    #[test]
    fn test_delete_lifecycle() {
        let mut page = Page::new(1);
        init(&mut page, INVALID_PAGE_ID);
        insert_record(&mut page, b"alpha").unwrap();

        mark_delete(&mut page, 0).unwrap();
        assert_eq!(get_record(&page, 0).unwrap(), None);

        rollback_delete(&mut page, 0).unwrap();
        assert_eq!(get_record(&page, 0).unwrap(), Some(&b"alpha"[..]));

        mark_delete(&mut page, 0).unwrap();
        apply_delete(&mut page, 0).unwrap();
        assert_eq!(get_record(&page, 0).unwrap(), None);
        assert!(rollback_delete(&mut page, 0).is_ok());
        assert_eq!(get_record(&page, 0).unwrap(), None);
    }

    #[test]
    fn test_update_grows_record() {
        let mut page = Page::new(1);
        init(&mut page, INVALID_PAGE_ID);
        insert_record(&mut page, b"ab").unwrap();
        insert_record(&mut page, b"cd").unwrap();

        update_record(&mut page, 0, b"a much longer record body").unwrap();
        assert_eq!(get_record(&page, 0).unwrap(), Some(&b"a much longer record body"[..]));
        assert_eq!(get_record(&page, 1).unwrap(), Some(&b"cd"[..]));
    }

    #[test]
    fn test_insufficient_space() {
        let mut page = Page::new(1);
        init(&mut page, INVALID_PAGE_ID);
        let big = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            insert_record(&mut page, &big),
            Err(PageError::InsufficientSpace)
        ));
    }
}
