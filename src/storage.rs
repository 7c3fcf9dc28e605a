//! Storage layer implementation for slotdb.
//!
//! This module provides the foundation for persistent data storage using a page-based
//! architecture. Key components:
//!
//! - **HeapPage**: Fixed-size (8KB) page of length-prefixed records behind a 10-byte header
//! - **PageFileManager**: Reads/writes pages at fixed offsets of a backing file
//! - **Replacer**: Eviction order over unpinned pages (Clock or LRU)
//! - **BufferPoolManager**: Fixed-capacity cache of pages with pin/dirty tracking
//! - **DirtyPageWriter**: Background writer and checkpointer
//!
//! Durability is "last flushed page survives": there is no write-ahead log, and
//! anything still dirty in the pool at a crash is lost.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;
pub mod writer;

pub use buffer::replacer::{Replacer, ReplacerKind};
pub use buffer::{BufferPoolManager, BufferSlot, PinnedPage, SlotRef};
pub use disk::{PageFileManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, Page, PageId};
pub use writer::{DirtyPageWriter, WriterConfig};
