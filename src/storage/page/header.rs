use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::error::PageError;

// Header page layout:
// - record_count: u32 (4 bytes)
// - records: [name_len: u32 | name bytes | root_page_id: i32]*
//
// The header page (page 0) maps index names to their root page ids so that
// trees can be reopened after the root moves.

/// Look up the root page id recorded for an index name.
pub fn get_record(page: &Page, name: &str) -> Option<PageId> {
    read_records(page)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, root)| root)
}

/// Record a new `name -> root` entry. Fails if the name already exists or
/// the page is out of space.
pub fn insert_record(page: &mut Page, name: &str, root: PageId) -> Result<(), PageError> {
    let mut records = read_records(page);
    if records.iter().any(|(n, _)| n == name) {
        return Err(PageError::RecordExists);
    }
    records.push((name.to_string(), root));
    write_records(page, &records)
}

/// Update an existing `name -> root` entry. Returns `false` if absent.
pub fn update_record(page: &mut Page, name: &str, root: PageId) -> Result<bool, PageError> {
    let mut records = read_records(page);
    let Some(entry) = records.iter_mut().find(|(n, _)| n == name) else {
        return Ok(false);
    };
    entry.1 = root;
    write_records(page, &records)?;
    Ok(true)
}

/// Drop a `name -> root` entry. Returns `false` if absent.
pub fn remove_record(page: &mut Page, name: &str) -> Result<bool, PageError> {
    let mut records = read_records(page);
    let before = records.len();
    records.retain(|(n, _)| n != name);
    if records.len() == before {
        return Ok(false);
    }
    write_records(page, &records)?;
    Ok(true)
}

fn read_records(page: &Page) -> Vec<(String, PageId)> {
    let count = LittleEndian::read_u32(&page.data[0..4]) as usize;
    let mut records = Vec::with_capacity(count);
    let mut offset = 4;

    for _ in 0..count {
        let name_len = LittleEndian::read_u32(&page.data[offset..offset + 4]) as usize;
        offset += 4;
        let name = String::from_utf8_lossy(&page.data[offset..offset + name_len]).into_owned();
        offset += name_len;
        let root = LittleEndian::read_i32(&page.data[offset..offset + 4]);
        offset += 4;
        records.push((name, root));
    }

    records
}

fn write_records(page: &mut Page, records: &[(String, PageId)]) -> Result<(), PageError> {
    let needed: usize = 4 + records.iter().map(|(n, _)| 8 + n.len()).sum::<usize>();
    if needed > PAGE_SIZE {
        return Err(PageError::InsufficientSpace);
    }

    page.data.fill(0);
    LittleEndian::write_u32(&mut page.data[0..4], records.len() as u32);
    let mut offset = 4;

    for (name, root) in records {
        LittleEndian::write_u32(&mut page.data[offset..offset + 4], name.len() as u32);
        offset += 4;
        page.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        offset += name.len();
        LittleEndian::write_i32(&mut page.data[offset..offset + 4], *root);
        offset += 4;
    }

    Ok(())
}
