use crate::storage::error::StorageResult;
use crate::storage::page::{HeapPage, Page, PageId};
use crate::storage::PAGE_SIZE;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Reads and writes fixed-size pages at `page_id * PAGE_SIZE` in a backing
/// file. Holds no cache and no open handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageFileManager;

impl PageFileManager {
    pub fn new() -> Self {
        Self
    }

    /// Reads one page. A missing file or a page past the end of the file
    /// yields a fresh empty page; a page with an invalid signature comes
    /// back with its header rewritten.
    pub fn read(&self, page_id: PageId, path: &Path) -> StorageResult<HeapPage> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist, page {} starts empty", path.display(), page_id);
                return Ok(HeapPage::new(page_id));
            }
            Err(e) => return Err(e.into()),
        };

        let offset = page_id.offset();
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            return Ok(HeapPage::new(page_id));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                // Short tail page, the rest stays zeroed
                break;
            }
            filled += n;
        }

        let mut page = HeapPage::from_bytes(page_id, &buf)?;
        if page.heal_header() {
            debug!("page {} had no valid signature, header rewritten", page_id);
        }
        Ok(page)
    }

    /// Writes exactly `PAGE_SIZE` bytes at the page's offset, creating the
    /// file when absent.
    pub fn write(&self, page: &HeapPage, path: &Path) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.seek(SeekFrom::Start(page.page_id().offset()))?;
        file.write_all(page.bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Number of whole pages stored in the file, 0 when it does not exist.
    pub fn num_pages(&self, path: &Path) -> StorageResult<u32> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok((meta.len() / PAGE_SIZE as u64) as u32),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
