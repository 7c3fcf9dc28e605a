pub mod page_manager;

pub use page_manager::PageFileManager;

pub const PAGE_SIZE: usize = 8192;
