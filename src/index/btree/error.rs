use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;
use crate::storage::page::PageError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Node too large for page")]
    NodeTooLarge,

    #[error("Key codec error: {0}")]
    KeyCodec(String),

    #[error("Invalid node type on page {0}")]
    InvalidNodeType(PageId),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Header page error: {0}")]
    Header(#[from] PageError),
}
