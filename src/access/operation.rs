use crate::access::value::{decode_row, encode_row, DataType, Value};
use crate::catalog::{Catalog, TableDefinition};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::StorageError;
use crate::storage::page::heap_page::HEADER_SIZE;
use crate::storage::page::{Page, PageId};
use crate::storage::PAGE_SIZE;
use anyhow::Result;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

// Length prefix stored in front of every record
const RECORD_OVERHEAD: usize = 4;

/// Row-level insert and scan over the heap pages the catalog assigns to
/// each table.
pub struct OperationManager {
    catalog: Arc<Catalog>,
    buffer_pool: BufferPoolManager,
    // Appends read-modify-write the last page of a table
    append_lock: Mutex<()>,
}

impl OperationManager {
    pub fn new(catalog: Arc<Catalog>, buffer_pool: BufferPoolManager) -> Self {
        Self {
            catalog,
            buffer_pool,
            append_lock: Mutex::new(()),
        }
    }

    /// Append a row to the table's last page, allocating a new page when it
    /// is full. Returns the page the row landed on.
    pub fn insert(&self, table_name: &str, values: &[Value]) -> Result<PageId> {
        let table = self.catalog.table(table_name)?;
        let schema = self.schema_of(&table)?;
        let record = encode_row(values, &schema)?;

        let required = RECORD_OVERHEAD + record.len();
        let available = PAGE_SIZE - HEADER_SIZE;
        if required > available {
            return Err(StorageError::PageFull {
                required,
                available,
            }
            .into());
        }

        let _append = self.append_lock.lock();

        if let Some(&last) = self.catalog.table_pages(&table)?.last() {
            if self.append_to(last, &record)? {
                return Ok(last);
            }
        }

        let page_id = self.buffer_pool.new_page()?;
        if !self.append_to(page_id, &record)? {
            return Err(StorageError::PageFull {
                required,
                available,
            }
            .into());
        }
        self.catalog.add_table_page(&table.name, page_id)?;
        debug!("table '{}' extended with page {}", table.name, page_id);

        Ok(page_id)
    }

    /// Scan the table in page order and project the requested columns. An
    /// empty column list selects every column.
    pub fn select(&self, table_name: &str, columns: &[&str]) -> Result<Vec<Vec<Value>>> {
        let table = self.catalog.table(table_name)?;
        let schema = self.schema_of(&table)?;

        let projection = if columns.is_empty() {
            (0..schema.len()).collect::<Vec<_>>()
        } else {
            columns
                .iter()
                .map(|name| {
                    self.catalog
                        .column(&table, name)
                        .map(|c| c.position as usize)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut rows = Vec::new();
        for page_id in self.catalog.table_pages(&table)? {
            let pinned = self.buffer_pool.fetch_page(page_id)?;
            let page = pinned.page();
            for record in page.records() {
                let row = decode_row(record, &schema)?;
                rows.push(projection.iter().map(|&i| row[i].clone()).collect());
            }
        }

        Ok(rows)
    }

    fn schema_of(&self, table: &TableDefinition) -> Result<Vec<DataType>> {
        self.catalog
            .columns_of(table)?
            .iter()
            .map(|column| -> Result<DataType> {
                let definition = self.catalog.type_of(column.type_oid)?;
                DataType::from_definition(&definition)
            })
            .collect()
    }

    /// Returns false when the page has no room for `record`.
    fn append_to(&self, page_id: PageId, record: &[u8]) -> Result<bool> {
        let pinned = self.buffer_pool.fetch_page(page_id)?;
        let mut page = pinned.page().clone();
        match page.write(record) {
            Ok(()) => {
                self.buffer_pool.update_page(page_id, page)?;
                Ok(true)
            }
            Err(StorageError::PageFull { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
