pub mod heap;
pub mod iterator;

use thiserror::Error;

use crate::common::types::Rid;
use crate::storage::buffer::BufferPoolError;
use crate::storage::page::PageError;

pub use heap::TableHeap;
pub use iterator::TableIterator;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Tuple not found at rid {0}")]
    TupleNotFound(Rid),
}
