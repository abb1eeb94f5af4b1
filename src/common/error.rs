use thiserror::Error;

use super::types::PageId;

/// Errors surfaced by the storage core
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("all frames are pinned, no victim available")]
    OutOfMemory,

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("disk scheduler channel error: {0}")]
    Channel(String),

    #[error("header page is full")]
    HeaderFull,

    #[error("index corrupted: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
