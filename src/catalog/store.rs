//! Catalog files: each holds one kind of definition record, packed into heap
//! pages and read back through the [`PageFileManager`].

use crate::catalog::{CatalogError, CatalogResult};
use crate::storage::disk::PageFileManager;
use crate::storage::error::StorageError;
use crate::storage::page::{HeapPage, Page, PageId};
use crate::storage::PAGE_SIZE;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use std::fs::OpenOptions;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const TYPES_FILE: &str = "types_definitions.dat";
pub const TABLES_FILE: &str = "table_definitions.dat";
pub const COLUMNS_FILE: &str = "column_definitions.dat";
pub const PAGES_FILE: &str = "table_pages.dat";

/// One entry of a table's page directory.
///
/// Record layout: `table_oid:i32, page_id:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDirectoryEntry {
    pub table_oid: i32,
    pub page_id: PageId,
}

impl PageDirectoryEntry {
    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        let mut data = Vec::with_capacity(8);
        data.write_i32::<LittleEndian>(self.table_oid)?;
        data.write_u32::<LittleEndian>(self.page_id.0)?;
        Ok(data)
    }

    pub fn from_bytes(raw: &[u8]) -> CatalogResult<Self> {
        if raw.len() != 8 {
            return Err(CatalogError::Malformed(format!(
                "page directory entry is {} bytes, expected 8",
                raw.len()
            )));
        }
        let mut cursor = Cursor::new(raw);
        let table_oid = cursor.read_i32::<LittleEndian>()?;
        let page_id = PageId(cursor.read_u32::<LittleEndian>()?);
        Ok(Self { table_oid, page_id })
    }
}

#[derive(Debug)]
pub struct CatalogStore {
    dir: PathBuf,
    file_manager: PageFileManager,
}

impl CatalogStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            file_manager: PageFileManager::new(),
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Every record of `file` in page order. A missing file has none.
    pub fn read_records(&self, file: &str) -> CatalogResult<Vec<Vec<u8>>> {
        let path = self.path(file);
        let mut records = Vec::new();
        for n in 0..self.file_manager.num_pages(&path)? {
            let page = self.file_manager.read(PageId(n), &path)?;
            records.extend(page.records().map(<[u8]>::to_vec));
        }
        Ok(records)
    }

    /// Rewrites `file` with `records`, starting a new page whenever the
    /// current one is full.
    pub fn write_records(&self, file: &str, records: &[Vec<u8>]) -> CatalogResult<()> {
        let path = self.path(file);
        let mut page = HeapPage::new(PageId(0));
        for record in records {
            match page.write(record) {
                Ok(()) => {}
                Err(StorageError::PageFull { .. }) if page.size() > 0 => {
                    self.file_manager.write(&page, &path)?;
                    page = HeapPage::new(PageId(page.page_id().0 + 1));
                    page.write(record)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.file_manager.write(&page, &path)?;

        // Drop pages left over from a longer previous version
        let pages = u64::from(page.page_id().0) + 1;
        if u64::from(self.file_manager.num_pages(&path)?) > pages {
            OpenOptions::new()
                .write(true)
                .open(&path)?
                .set_len(pages * PAGE_SIZE as u64)?;
        }
        debug!(
            "wrote {} records to {} ({} pages)",
            records.len(),
            path.display(),
            pages
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_entry_layout() -> CatalogResult<()> {
        let entry = PageDirectoryEntry {
            table_oid: 100,
            page_id: PageId(9),
        };
        let bytes = entry.to_bytes()?;

        assert_eq!(&bytes[0..4], &100i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &9u32.to_le_bytes());
        assert_eq!(PageDirectoryEntry::from_bytes(&bytes)?, entry);
        assert!(PageDirectoryEntry::from_bytes(&bytes[..7]).is_err());

        Ok(())
    }

    #[test]
    fn test_missing_file_has_no_records() -> CatalogResult<()> {
        let dir = tempdir()?;
        let store = CatalogStore::new(dir.path());

        assert!(store.read_records(TABLES_FILE)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_records_span_pages() -> CatalogResult<()> {
        let dir = tempdir()?;
        let store = CatalogStore::new(dir.path());
        let records: Vec<Vec<u8>> = (0..40u8).map(|i| vec![i; 1000]).collect();

        store.write_records(COLUMNS_FILE, &records)?;
        let path = store.path(COLUMNS_FILE);
        assert!(PageFileManager::new().num_pages(&path)? > 1);
        assert_eq!(store.read_records(COLUMNS_FILE)?, records);

        // A shorter rewrite does not leave stale pages behind
        store.write_records(COLUMNS_FILE, &records[..2])?;
        assert_eq!(PageFileManager::new().num_pages(&path)?, 1);
        assert_eq!(store.read_records(COLUMNS_FILE)?, records[..2].to_vec());

        Ok(())
    }
}
