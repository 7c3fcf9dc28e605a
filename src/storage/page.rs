pub mod heap_page;

use crate::storage::error::StorageResult;
use crate::storage::PAGE_SIZE;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Byte offset of this page inside its backing file.
    pub fn offset(self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-size page holding length-prefixed records.
pub trait Page {
    fn page_id(&self) -> PageId;

    fn bytes(&self) -> &[u8; PAGE_SIZE];

    /// Number of records stored on the page.
    fn size(&self) -> usize;

    /// Whether the header carries the page signature.
    fn is_valid(&self) -> bool;

    fn read(&self, index: usize) -> StorageResult<&[u8]>;

    fn write(&mut self, data: &[u8]) -> StorageResult<()>;
}

pub use heap_page::HeapPage;
