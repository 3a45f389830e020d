use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, PageId, Rid, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{InternalNode, LeafNode, Node};

// Node page layout (host-native little-endian headers):
// - page_type: i32     (0 invalid, 1 leaf, 2 internal)
// - size: i32          (entry count)
// - max_size: i32
// - parent_page_id: i32
// - page_id: i32
// - next_page_id: i32  (leaves only)
// - entries: [key_len: u32 | key bincode bytes | value]*
//   where value is `page_id: i32 | slot_num: u32` for leaves and
//   `child_page_id: i32` for internals.

const PAGE_TYPE_LEAF: i32 = 1;
const PAGE_TYPE_INTERNAL: i32 = 2;

const PARENT_OFFSET: usize = 12;
const LEAF_HEADER_SIZE: usize = 24;
const INTERNAL_HEADER_SIZE: usize = 20;

pub fn encode_leaf<K>(node: &LeafNode<K>, page: &mut Page) -> Result<(), BTreeError>
where
    K: Serialize,
{
    page.data.fill(0);
    LittleEndian::write_i32(&mut page.data[0..4], PAGE_TYPE_LEAF);
    LittleEndian::write_i32(&mut page.data[4..8], node.entries.len() as i32);
    LittleEndian::write_i32(&mut page.data[8..12], node.max_size as i32);
    LittleEndian::write_i32(&mut page.data[12..16], node.parent_page_id);
    LittleEndian::write_i32(&mut page.data[16..20], node.page_id);
    LittleEndian::write_i32(&mut page.data[20..24], node.next_page_id);

    let mut offset = LEAF_HEADER_SIZE;
    for (key, rid) in &node.entries {
        offset = write_key(page, offset, key)?;
        if offset + 8 > PAGE_SIZE {
            return Err(BTreeError::NodeTooLarge);
        }
        LittleEndian::write_i32(&mut page.data[offset..offset + 4], rid.page_id);
        LittleEndian::write_u32(&mut page.data[offset + 4..offset + 8], rid.slot_num);
        offset += 8;
    }
    Ok(())
}

pub fn encode_internal<K>(node: &InternalNode<K>, page: &mut Page) -> Result<(), BTreeError>
where
    K: Serialize,
{
    page.data.fill(0);
    LittleEndian::write_i32(&mut page.data[0..4], PAGE_TYPE_INTERNAL);
    LittleEndian::write_i32(&mut page.data[4..8], node.entries.len() as i32);
    LittleEndian::write_i32(&mut page.data[8..12], node.max_size as i32);
    LittleEndian::write_i32(&mut page.data[12..16], node.parent_page_id);
    LittleEndian::write_i32(&mut page.data[16..20], node.page_id);

    let mut offset = INTERNAL_HEADER_SIZE;
    for (key, child) in &node.entries {
        offset = write_key(page, offset, key)?;
        if offset + 4 > PAGE_SIZE {
            return Err(BTreeError::NodeTooLarge);
        }
        LittleEndian::write_i32(&mut page.data[offset..offset + 4], *child);
        offset += 4;
    }
    Ok(())
}

pub fn encode_node<K>(node: &Node<K>, page: &mut Page) -> Result<(), BTreeError>
where
    K: Serialize + Clone + Ord,
{
    match node {
        Node::Leaf(leaf) => encode_leaf(leaf, page),
        Node::Internal(internal) => encode_internal(internal, page),
    }
}

pub fn decode_node<K>(page: &Page) -> Result<Node<K>, BTreeError>
where
    K: DeserializeOwned,
{
    let page_type = LittleEndian::read_i32(&page.data[0..4]);
    let size = LittleEndian::read_i32(&page.data[4..8]) as usize;
    let max_size = LittleEndian::read_i32(&page.data[8..12]) as usize;
    let parent_page_id = LittleEndian::read_i32(&page.data[12..16]);
    let page_id = LittleEndian::read_i32(&page.data[16..20]);

    match page_type {
        PAGE_TYPE_LEAF => {
            let next_page_id = LittleEndian::read_i32(&page.data[20..24]);
            let mut entries = Vec::with_capacity(size);
            let mut offset = LEAF_HEADER_SIZE;
            for _ in 0..size {
                let (key, next) = read_key::<K>(page, offset)?;
                offset = next;
                let rid_page = LittleEndian::read_i32(&page.data[offset..offset + 4]);
                let rid_slot = LittleEndian::read_u32(&page.data[offset + 4..offset + 8]);
                offset += 8;
                entries.push((key, Rid::new(rid_page, rid_slot)));
            }
            Ok(Node::Leaf(LeafNode {
                page_id,
                parent_page_id,
                next_page_id,
                max_size,
                entries,
            }))
        }
        PAGE_TYPE_INTERNAL => {
            let mut entries = Vec::with_capacity(size);
            let mut offset = INTERNAL_HEADER_SIZE;
            for _ in 0..size {
                let (key, next) = read_key::<K>(page, offset)?;
                offset = next;
                let child = LittleEndian::read_i32(&page.data[offset..offset + 4]);
                offset += 4;
                entries.push((key, child));
            }
            Ok(Node::Internal(InternalNode {
                page_id,
                parent_page_id,
                max_size,
                entries,
            }))
        }
        _ => Err(BTreeError::InvalidNodeType(page.page_id)),
    }
}

/// Patch only the parent pointer in an encoded node page. Used when a split
/// or merge re-homes children without rewriting them.
pub fn write_parent_pointer(page: &mut Page, parent_page_id: PageId) {
    LittleEndian::write_i32(
        &mut page.data[PARENT_OFFSET..PARENT_OFFSET + 4],
        parent_page_id,
    );
}

fn write_key<K: Serialize>(page: &mut Page, offset: usize, key: &K) -> Result<usize, BTreeError> {
    let bytes = bincode::serialize(key).map_err(|e| BTreeError::KeyCodec(e.to_string()))?;
    if offset + 4 + bytes.len() > PAGE_SIZE {
        return Err(BTreeError::NodeTooLarge);
    }
    LittleEndian::write_u32(&mut page.data[offset..offset + 4], bytes.len() as u32);
    page.data[offset + 4..offset + 4 + bytes.len()].copy_from_slice(&bytes);
    Ok(offset + 4 + bytes.len())
}

fn read_key<K: DeserializeOwned>(page: &Page, offset: usize) -> Result<(K, usize), BTreeError> {
    let len = LittleEndian::read_u32(&page.data[offset..offset + 4]) as usize;
    let start = offset + 4;
    let key = bincode::deserialize(&page.data[start..start + len])
        .map_err(|e| BTreeError::KeyCodec(e.to_string()))?;
    Ok((key, start + len))
}
