//! Storage layer error types.

use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: index {index} (page holds {size} records)")]
    RecordNotFound { index: usize, size: usize },

    #[error("Page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    #[error("Empty records cannot be stored")]
    EmptyRecord,

    #[error("Buffer pool is full: all {capacity} slots are pinned")]
    BufferPoolFull { capacity: usize },

    #[error("No page ids left to allocate")]
    PageIdsExhausted,

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Page id mismatch: slot holds {expected}, new content is {found}")]
    PageIdMismatch { expected: PageId, found: PageId },

    #[error("Page {0} is not pinned")]
    NotPinned(PageId),

    #[error("Corrupt page {page_id} at offset {offset}: {reason}")]
    CorruptPage {
        page_id: PageId,
        offset: usize,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
