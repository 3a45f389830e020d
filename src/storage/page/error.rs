use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Insufficient space in page")]
    InsufficientSpace,

    #[error("Invalid slot number: {0}")]
    InvalidSlot(u32),

    #[error("Record not found")]
    RecordNotFound,

    #[error("Record already exists")]
    RecordExists,
}
