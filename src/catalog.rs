//! Catalog of types, tables and columns.
//!
//! The catalog also keeps the page directory of each table: the ordered
//! list of heap pages holding its rows. A catalog opened on a directory
//! keeps every definition and directory entry in catalog files (see
//! [`store`]) and rewrites them on each change; [`Catalog::new`] builds one
//! that lives only in memory.

pub mod column_def;
pub mod store;
pub mod table_def;
pub mod type_def;

pub use column_def::ColumnDefinition;
pub use store::PageDirectoryEntry;
pub use table_def::TableDefinition;
pub use type_def::TypeDefinition;

use crate::storage::error::StorageError;
use crate::storage::page::PageId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use store::{CatalogStore, COLUMNS_FILE, PAGES_FILE, TABLES_FILE, TYPES_FILE};
use thiserror::Error;

pub const TABLE_TYPE: &str = "table";
/// File every table's rows are stored in
pub const HEAP_FILE_NAME: &str = "heap.dat";
const FIRST_USER_OID: i32 = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("type '{0}' not found")]
    TypeNotFound(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("malformed catalog record: {0}")]
    Malformed(String),

    #[error("catalog record codec error: {0}")]
    Codec(#[from] io::Error),

    #[error("catalog file error: {0}")]
    Storage(#[from] StorageError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub(crate) fn write_string<W: Write>(out: &mut W, value: &str) -> CatalogResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        CatalogError::InvalidDefinition(format!("name of {} bytes is too long", value.len()))
    })?;
    out.write_u16::<LittleEndian>(len)?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

pub(crate) fn read_string<R: Read>(input: &mut R) -> CatalogResult<String> {
    let len = input.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| CatalogError::Malformed(e.to_string()))
}

fn builtin_types() -> Vec<TypeDefinition> {
    vec![
        TypeDefinition::new(1, "integer", 4),
        TypeDefinition::new(2, "bigint", 8),
        TypeDefinition::new(3, "boolean", 1),
        TypeDefinition::new(4, "varchar", -1),
    ]
}

#[derive(Debug)]
struct CatalogState {
    types: Vec<TypeDefinition>,
    tables: HashMap<String, TableDefinition>,
    columns: HashMap<i32, Vec<ColumnDefinition>>,
    pages: HashMap<i32, Vec<PageId>>,
    next_oid: i32,
}

impl CatalogState {
    fn empty(types: Vec<TypeDefinition>) -> Self {
        Self {
            types,
            tables: HashMap::new(),
            columns: HashMap::new(),
            pages: HashMap::new(),
            next_oid: FIRST_USER_OID,
        }
    }

    fn tables_by_oid(&self) -> Vec<&TableDefinition> {
        let mut tables: Vec<_> = self.tables.values().collect();
        tables.sort_by_key(|t| t.oid);
        tables
    }
}

#[derive(Debug)]
pub struct Catalog {
    state: RwLock<CatalogState>,
    store: Option<CatalogStore>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// A catalog that is never written to disk.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::empty(builtin_types())),
            store: None,
        }
    }

    /// Loads the catalog files in `dir`, creating them on first use.
    pub fn open(dir: &Path) -> CatalogResult<Self> {
        let store = CatalogStore::new(dir);

        let type_records = store.read_records(TYPES_FILE)?;
        let types = if type_records.is_empty() {
            let types = builtin_types();
            let records = types
                .iter()
                .map(TypeDefinition::to_bytes)
                .collect::<CatalogResult<Vec<_>>>()?;
            store.write_records(TYPES_FILE, &records)?;
            types
        } else {
            type_records
                .iter()
                .map(|r| TypeDefinition::from_bytes(r))
                .collect::<CatalogResult<Vec<_>>>()?
        };

        let mut state = CatalogState::empty(types);
        for record in store.read_records(TABLES_FILE)? {
            let table = TableDefinition::from_bytes(&record)?;
            if state.columns.contains_key(&table.oid) || state.tables.contains_key(&table.name) {
                return Err(CatalogError::Malformed(format!(
                    "duplicate table '{}' (oid {})",
                    table.name, table.oid
                )));
            }
            state.next_oid = state.next_oid.max(table.oid + 1);
            state.columns.insert(table.oid, Vec::new());
            state.pages.insert(table.oid, Vec::new());
            state.tables.insert(table.name.clone(), table);
        }

        for record in store.read_records(COLUMNS_FILE)? {
            let column = ColumnDefinition::from_bytes(&record)?;
            if !state.types.iter().any(|t| t.oid == column.type_oid) {
                return Err(CatalogError::TypeNotFound(column.type_oid.to_string()));
            }
            state.next_oid = state.next_oid.max(column.oid + 1);
            state
                .columns
                .get_mut(&column.table_oid)
                .ok_or_else(|| {
                    CatalogError::Malformed(format!(
                        "column '{}' belongs to unknown table oid {}",
                        column.name, column.table_oid
                    ))
                })?
                .push(column);
        }
        for columns in state.columns.values_mut() {
            columns.sort_by_key(|c| c.position);
        }

        for record in store.read_records(PAGES_FILE)? {
            let entry = PageDirectoryEntry::from_bytes(&record)?;
            state
                .pages
                .get_mut(&entry.table_oid)
                .ok_or_else(|| {
                    CatalogError::Malformed(format!(
                        "page {} belongs to unknown table oid {}",
                        entry.page_id, entry.table_oid
                    ))
                })?
                .push(entry.page_id);
        }

        for table in state.tables.values_mut() {
            let pages = state.pages.get(&table.oid).map_or(0, Vec::len) as i32;
            if table.pages_count != pages {
                warn!(
                    "table '{}' records {} pages but its directory lists {}",
                    table.name, table.pages_count, pages
                );
                table.pages_count = pages;
            }
        }

        info!(
            "loaded catalog from {} ({} tables)",
            dir.display(),
            state.tables.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            store: Some(store),
        })
    }

    /// Rewrites the table, column and page directory files.
    fn persist(&self, state: &CatalogState) -> CatalogResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let tables = state.tables_by_oid();
        let mut table_records = Vec::with_capacity(tables.len());
        let mut column_records = Vec::new();
        let mut page_records = Vec::new();
        for table in tables {
            table_records.push(table.to_bytes()?);
            for column in state.columns.get(&table.oid).into_iter().flatten() {
                column_records.push(column.to_bytes()?);
            }
            for &page_id in state.pages.get(&table.oid).into_iter().flatten() {
                let entry = PageDirectoryEntry {
                    table_oid: table.oid,
                    page_id,
                };
                page_records.push(entry.to_bytes()?);
            }
        }

        store.write_records(TABLES_FILE, &table_records)?;
        store.write_records(COLUMNS_FILE, &column_records)?;
        store.write_records(PAGES_FILE, &page_records)?;
        Ok(())
    }

    /// Registers a table with the given `(column name, type name)` pairs.
    /// Columns are numbered by their position in the slice.
    pub fn create_table(
        &self,
        name: &str,
        columns: &[(&str, &str)],
    ) -> CatalogResult<TableDefinition> {
        if columns.is_empty() {
            return Err(CatalogError::InvalidDefinition(format!(
                "table '{}' has no columns",
                name
            )));
        }

        let mut state = self.state.write();
        if state.tables.contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }

        let table_oid = state.next_oid;
        let table = TableDefinition::new(
            table_oid,
            name,
            TABLE_TYPE,
            HEAP_FILE_NAME,
            0,
        )?;

        let mut definitions = Vec::with_capacity(columns.len());
        for (position, (column_name, type_name)) in columns.iter().enumerate() {
            if definitions
                .iter()
                .any(|c: &ColumnDefinition| c.name == *column_name)
            {
                return Err(CatalogError::InvalidDefinition(format!(
                    "duplicate column '{}'",
                    column_name
                )));
            }
            let type_oid = state
                .types
                .iter()
                .find(|t| t.name == *type_name)
                .map(|t| t.oid)
                .ok_or_else(|| CatalogError::TypeNotFound(type_name.to_string()))?;
            definitions.push(ColumnDefinition::new(
                table_oid + 1 + position as i32,
                table_oid,
                type_oid,
                *column_name,
                position as i32,
            )?);
        }

        state.next_oid = table_oid + 1 + columns.len() as i32;
        state.columns.insert(table_oid, definitions);
        state.pages.insert(table_oid, Vec::new());
        state.tables.insert(name.to_string(), table.clone());
        if let Err(e) = self.persist(&state) {
            state.tables.remove(name);
            state.columns.remove(&table_oid);
            state.pages.remove(&table_oid);
            state.next_oid = table_oid;
            return Err(e);
        }
        debug!(
            "created table '{}' (oid {}) with {} columns",
            name,
            table_oid,
            columns.len()
        );
        Ok(table)
    }

    pub fn table(&self, name: &str) -> CatalogResult<TableDefinition> {
        self.state
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// All tables ordered by oid.
    pub fn list_tables(&self) -> Vec<TableDefinition> {
        let mut tables: Vec<_> = self.state.read().tables.values().cloned().collect();
        tables.sort_by_key(|t| t.oid);
        tables
    }

    /// Columns of `table` ordered by position.
    pub fn columns_of(&self, table: &TableDefinition) -> CatalogResult<Vec<ColumnDefinition>> {
        self.state
            .read()
            .columns
            .get(&table.oid)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(table.name.clone()))
    }

    pub fn column(&self, table: &TableDefinition, name: &str) -> CatalogResult<ColumnDefinition> {
        self.columns_of(table)?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CatalogError::ColumnNotFound {
                table: table.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn type_of(&self, oid: i32) -> CatalogResult<TypeDefinition> {
        self.state
            .read()
            .types
            .iter()
            .find(|t| t.oid == oid)
            .cloned()
            .ok_or_else(|| CatalogError::TypeNotFound(oid.to_string()))
    }

    pub fn type_by_name(&self, name: &str) -> CatalogResult<TypeDefinition> {
        self.state
            .read()
            .types
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::TypeNotFound(name.to_string()))
    }

    /// Heap pages of `table` in scan order.
    pub fn table_pages(&self, table: &TableDefinition) -> CatalogResult<Vec<PageId>> {
        self.state
            .read()
            .pages
            .get(&table.oid)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(table.name.clone()))
    }

    /// Appends `page_id` to the table's page directory and returns the
    /// updated definition.
    pub fn add_table_page(&self, name: &str, page_id: PageId) -> CatalogResult<TableDefinition> {
        let mut state = self.state.write();
        let state = &mut *state;
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        let pages = state.pages.entry(table.oid).or_default();
        pages.push(page_id);
        table.pages_count = pages.len() as i32;
        let oid = table.oid;

        if let Err(e) = self.persist(state) {
            if let Some(pages) = state.pages.get_mut(&oid) {
                pages.pop();
            }
            if let Some(table) = state.tables.get_mut(name) {
                table.pages_count -= 1;
            }
            return Err(e);
        }

        let table = state
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        debug!(
            "table '{}' now spans {} pages (added {})",
            name, table.pages_count, page_id
        );
        Ok(table)
    }

    /// Highest page id any table's directory refers to.
    pub fn max_page_id(&self) -> Option<PageId> {
        self.state.read().pages.values().flatten().copied().max()
    }
}
