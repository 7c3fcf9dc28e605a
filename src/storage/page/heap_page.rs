use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use crate::storage::PAGE_SIZE;

/// Marks an initialized heap page.
pub const PAGE_SIGNATURE: u32 = 0x00DB_DB01;

// Header structure (10 bytes)
pub const HEADER_SIZE: usize = 10;
const SIGNATURE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const LOWER_OFFSET: usize = 6;
const UPPER_OFFSET: usize = 8;

// Every record is prefixed with its length as an i32
const LENGTH_PREFIX: usize = 4;

/// One page of records laid out as `(i32 length, bytes)` entries written
/// forward from the header. The first zero length marks free space.
///
/// Records are appended only; nothing is ever reclaimed.
#[derive(Clone)]
pub struct HeapPage {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
}

impl HeapPage {
    pub fn new(page_id: PageId) -> Self {
        let mut page = Self {
            page_id,
            data: Box::new([0u8; PAGE_SIZE]),
        };
        page.init_header();
        page
    }

    pub fn from_bytes(page_id: PageId, bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(StorageError::CorruptPage {
                page_id,
                offset: 0,
                reason: format!("expected {} bytes, got {}", PAGE_SIZE, bytes.len()),
            });
        }
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data.copy_from_slice(bytes);
        Ok(Self { page_id, data })
    }

    /// Rewrites an invalid header as an empty page. Returns whether anything
    /// changed.
    pub fn heal_header(&mut self) -> bool {
        if self.is_valid() {
            return false;
        }
        self.data.fill(0);
        self.init_header();
        true
    }

    pub fn lower(&self) -> u16 {
        self.get_u16(LOWER_OFFSET)
    }

    pub fn upper(&self) -> u16 {
        self.get_u16(UPPER_OFFSET)
    }

    /// Bytes left between the free-space cursor and `upper`.
    pub fn free_space(&self) -> StorageResult<usize> {
        let cursor = self.free_space_cursor()?;
        Ok(self.upper_bound().saturating_sub(cursor))
    }

    /// Iterates stored records in scan order.
    pub fn records(&self) -> Records<'_> {
        Records {
            page: self,
            pos: HEADER_SIZE,
            remaining: self.size(),
        }
    }

    fn init_header(&mut self) {
        self.data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4]
            .copy_from_slice(&PAGE_SIGNATURE.to_le_bytes());
        self.set_u16(SIZE_OFFSET, 0);
        self.set_u16(LOWER_OFFSET, HEADER_SIZE as u16);
        self.set_u16(UPPER_OFFSET, PAGE_SIZE as u16);
    }

    fn upper_bound(&self) -> usize {
        (self.upper() as usize).min(PAGE_SIZE)
    }

    /// Decodes the entry starting at `pos`. `None` means `pos` is the free
    /// space cursor.
    fn entry_at(&self, pos: usize) -> StorageResult<Option<(usize, usize)>> {
        let upper = self.upper_bound();
        if pos + LENGTH_PREFIX > upper {
            return Ok(None);
        }
        let length = i32::from_le_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ]);
        if length == 0 {
            return Ok(None);
        }
        let start = pos + LENGTH_PREFIX;
        if length < 0 || start + length as usize > upper {
            return Err(StorageError::CorruptPage {
                page_id: self.page_id,
                offset: pos,
                reason: format!("record length {} runs past upper {}", length, upper),
            });
        }
        Ok(Some((start, length as usize)))
    }

    fn free_space_cursor(&self) -> StorageResult<usize> {
        let mut pos = HEADER_SIZE;
        while let Some((start, length)) = self.entry_at(pos)? {
            pos = start + length;
        }
        Ok(pos)
    }

    fn get_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn set_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }
}

impl Page for HeapPage {
    fn page_id(&self) -> PageId {
        self.page_id
    }

    fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    fn size(&self) -> usize {
        self.get_u16(SIZE_OFFSET) as usize
    }

    fn is_valid(&self) -> bool {
        let signature = u32::from_le_bytes([
            self.data[SIGNATURE_OFFSET],
            self.data[SIGNATURE_OFFSET + 1],
            self.data[SIGNATURE_OFFSET + 2],
            self.data[SIGNATURE_OFFSET + 3],
        ]);
        signature == PAGE_SIGNATURE
    }

    fn read(&self, index: usize) -> StorageResult<&[u8]> {
        let size = self.size();
        if index >= size {
            return Err(StorageError::RecordNotFound { index, size });
        }

        let mut pos = HEADER_SIZE;
        for current in 0..=index {
            match self.entry_at(pos)? {
                Some((start, length)) if current == index => {
                    return Ok(&self.data[start..start + length]);
                }
                Some((start, length)) => pos = start + length,
                None => {
                    return Err(StorageError::CorruptPage {
                        page_id: self.page_id,
                        offset: pos,
                        reason: format!("header counts {} records, found {}", size, current),
                    })
                }
            }
        }
        Err(StorageError::RecordNotFound { index, size })
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Err(StorageError::EmptyRecord);
        }

        let cursor = self.free_space_cursor()?;
        let required = LENGTH_PREFIX + data.len();
        let available = self.upper_bound().saturating_sub(cursor);
        if required > available {
            return Err(StorageError::PageFull {
                required,
                available,
            });
        }

        self.data[cursor..cursor + LENGTH_PREFIX]
            .copy_from_slice(&(data.len() as i32).to_le_bytes());
        self.data[cursor + LENGTH_PREFIX..cursor + required].copy_from_slice(data);

        let size = self.size() as u16;
        self.set_u16(SIZE_OFFSET, size + 1);
        self.set_u16(LOWER_OFFSET, (cursor + required) as u16);
        Ok(())
    }
}

impl std::fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapPage")
            .field("page_id", &self.page_id)
            .field("valid", &self.is_valid())
            .field("size", &self.size())
            .field("lower", &self.lower())
            .field("upper", &self.upper_bound())
            .finish()
    }
}

/// Iterator over the records of a [`HeapPage`]. Stops at the free space
/// cursor, after `size` records, or at the first malformed entry.
pub struct Records<'a> {
    page: &'a HeapPage,
    pos: usize,
    remaining: usize,
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.page.entry_at(self.pos) {
            Ok(Some((start, length))) => {
                self.pos = start + length;
                self.remaining -= 1;
                Some(&self.page.data[start..start + length])
            }
            _ => {
                self.remaining = 0;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_heap_page_initialization() -> Result<()> {
        let page = HeapPage::new(PageId(42));

        assert_eq!(page.page_id(), PageId(42));
        assert!(page.is_valid());
        assert_eq!(page.size(), 0);
        assert_eq!(page.lower(), HEADER_SIZE as u16);
        assert_eq!(page.upper_bound(), PAGE_SIZE);
        assert_eq!(page.free_space()?, PAGE_SIZE - HEADER_SIZE);
        assert_eq!(&page.bytes()[0..4], &[0x01u8, 0xDB, 0xDB, 0x00]);

        Ok(())
    }

    #[test]
    fn test_write_and_read_records() -> Result<()> {
        let mut page = HeapPage::new(PageId(1));

        page.write(b"Hello, World!")?;
        page.write(b"Second record")?;

        assert_eq!(page.size(), 2);
        assert_eq!(page.read(0)?, b"Hello, World!");
        assert_eq!(page.read(1)?, b"Second record");
        assert_eq!(page.lower() as usize, HEADER_SIZE + 2 * 4 + 13 + 13);

        Ok(())
    }

    #[test]
    fn test_layout_is_length_prefixed() -> Result<()> {
        let mut page = HeapPage::new(PageId(1));
        page.write(&[7, 8, 9])?;

        let bytes = page.bytes();
        assert_eq!(&bytes[4..6], &1u16.to_le_bytes());
        assert_eq!(&bytes[10..14], &3i32.to_le_bytes());
        assert_eq!(&bytes[14..17], &[7u8, 8, 9]);
        assert_eq!(&bytes[17..21], &[0u8; 4]);

        Ok(())
    }

    #[test]
    fn test_read_out_of_range() -> Result<()> {
        let mut page = HeapPage::new(PageId(1));
        assert!(matches!(
            page.read(0),
            Err(StorageError::RecordNotFound { index: 0, size: 0 })
        ));

        page.write(b"only")?;
        assert!(page.read(1).is_err());
        assert!(page.read(100).is_err());

        Ok(())
    }

    #[test]
    fn test_size_past_stored_records_is_corrupt() -> Result<()> {
        let mut page = HeapPage::new(PageId(3));
        page.write(b"one")?;
        page.set_u16(SIZE_OFFSET, 2);

        assert!(matches!(page.read(1), Err(StorageError::CorruptPage { .. })));
        assert_eq!(page.records().count(), 1);

        Ok(())
    }

    #[test]
    fn test_page_full_leaves_page_untouched() -> Result<()> {
        let mut page = HeapPage::new(PageId(1));
        let before = page.bytes().to_vec();

        let too_big = vec![0xAA; PAGE_SIZE - HEADER_SIZE - 3];
        let result = page.write(&too_big);

        assert!(matches!(result, Err(StorageError::PageFull { .. })));
        assert_eq!(page.bytes().to_vec(), before);
        assert_eq!(page.size(), 0);

        Ok(())
    }

    #[test]
    fn test_fill_page_exactly() -> Result<()> {
        let mut page = HeapPage::new(PageId(1));
        let exact = vec![0x55; PAGE_SIZE - HEADER_SIZE - 4];

        page.write(&exact)?;
        assert_eq!(page.free_space()?, 0);
        assert_eq!(page.read(0)?, exact.as_slice());
        assert!(page.write(&[1]).is_err());

        Ok(())
    }

    #[test]
    fn test_page_fills_up() -> Result<()> {
        let mut page = HeapPage::new(PageId(1));
        let record = vec![0xAA; 1000];
        let mut count = 0;

        while page.free_space()? >= record.len() + 4 {
            page.write(&record)?;
            count += 1;
        }

        assert_eq!(count, 8);
        assert!(page.write(&record).is_err());
        assert_eq!(page.records().count(), 8);

        Ok(())
    }

    #[test]
    fn test_empty_record_rejected() {
        let mut page = HeapPage::new(PageId(1));
        assert!(matches!(page.write(&[]), Err(StorageError::EmptyRecord)));
        assert_eq!(page.size(), 0);
    }

    #[test]
    fn test_heal_header() -> Result<()> {
        let mut page = HeapPage::from_bytes(PageId(5), &[0u8; PAGE_SIZE])?;
        assert!(!page.is_valid());

        assert!(page.heal_header());
        assert!(page.is_valid());
        assert_eq!(page.size(), 0);
        assert_eq!(page.lower(), HEADER_SIZE as u16);
        assert_eq!(page.upper_bound(), PAGE_SIZE);

        assert!(!page.heal_header());

        Ok(())
    }

    #[test]
    fn test_from_bytes_wrong_length() {
        assert!(HeapPage::from_bytes(PageId(0), &[0u8; 100]).is_err());
    }

    #[test]
    fn test_from_existing_bytes() -> Result<()> {
        let mut original = HeapPage::new(PageId(123));
        original.write(b"Persistent data")?;

        let page = HeapPage::from_bytes(PageId(123), original.bytes())?;
        assert_eq!(page.size(), 1);
        assert_eq!(page.read(0)?, b"Persistent data");

        Ok(())
    }
}
