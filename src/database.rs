use crate::access::{OperationManager, Value};
pub use crate::catalog::HEAP_FILE_NAME;

use crate::catalog::{Catalog, TableDefinition};
use crate::config::StorageConfig;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::disk::PageFileManager;
use crate::storage::page::PageId;
use crate::storage::writer::DirtyPageWriter;
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a running database needs, built once at startup: the
/// catalog, the buffer pool over the heap file, the operation manager and
/// the background dirty page writer.
pub struct Database {
    data_dir: PathBuf,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPoolManager,
    operations: OperationManager,
    writer: DirtyPageWriter,
}

impl Database {
    /// Open (or create) the database stored in `data_dir`. Tables created by
    /// an earlier run are loaded from the catalog files.
    pub fn open(data_dir: &Path, config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let heap_path = data_dir.join(HEAP_FILE_NAME);
        let buffer_pool = BufferPoolManager::new(
            config.pool_capacity,
            PageFileManager::new(),
            config.replacer.build(),
            &heap_path,
        );
        let catalog = Arc::new(
            Catalog::open(data_dir)
                .with_context(|| format!("Failed to load catalog from {:?}", data_dir))?,
        );
        if let Some(page_id) = catalog.max_page_id() {
            buffer_pool.reserve_page_id(page_id);
        }
        let operations = OperationManager::new(catalog.clone(), buffer_pool.clone());
        let writer = DirtyPageWriter::start(buffer_pool.clone(), config.writer)
            .context("Failed to start dirty page writer")?;

        info!(
            "opened database at {:?} ({} page pool, {:?} replacer)",
            heap_path, config.pool_capacity, config.replacer
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            catalog,
            buffer_pool,
            operations,
            writer,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    /// Create a new table from `(column name, type name)` pairs
    pub fn create_table(&self, name: &str, columns: &[(&str, &str)]) -> Result<TableDefinition> {
        Ok(self.catalog.create_table(name, columns)?)
    }

    pub fn insert(&self, table: &str, values: &[Value]) -> Result<PageId> {
        self.operations.insert(table, values)
    }

    pub fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<Vec<Value>>> {
        self.operations.select(table, columns)
    }

    /// Stop background flushing and write every remaining dirty page.
    /// Returns how many pages the final drain wrote.
    pub fn close(self) -> Result<usize> {
        let flushed = self
            .writer
            .shutdown()
            .context("Failed to drain dirty pages")?;
        info!("closed database at {:?}", self.data_dir);
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::Page;
    use crate::storage::{ReplacerKind, WriterConfig};
    use std::time::Duration;
    use tempfile::tempdir;

    fn quiet_config() -> StorageConfig {
        StorageConfig {
            pool_capacity: 8,
            replacer: ReplacerKind::Lru,
            writer: WriterConfig {
                writer_interval: Duration::from_secs(60),
                checkpoint_interval: Duration::from_secs(60),
                max_pages_per_cycle: 100,
            },
        }
    }

    #[test]
    fn test_open_creates_data_dir() -> Result<()> {
        let dir = tempdir()?;
        let data_dir = dir.path().join("nested").join("data");

        let db = Database::open(&data_dir, quiet_config())?;
        assert!(data_dir.is_dir());
        assert_eq!(db.buffer_pool().path(), data_dir.join(HEAP_FILE_NAME));
        assert_eq!(db.buffer_pool().capacity(), 8);

        db.close()?;
        Ok(())
    }

    #[test]
    fn test_close_drains_dirty_pages() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(dir.path(), quiet_config())?;
        db.create_table("t", &[("id", "integer"), ("label", "varchar")])?;

        let page_id = db.insert("t", &[Value::Integer(7), Value::Text("seven".into())])?;

        let heap_path = db.buffer_pool().path().to_path_buf();
        db.close()?;

        let page = PageFileManager::new().read(page_id, &heap_path)?;
        assert_eq!(page.size(), 1);
        Ok(())
    }

    #[test]
    fn test_table_lifecycle() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(dir.path(), quiet_config())?;

        db.create_table("flags", &[("on", "boolean"), ("count", "bigint")])?;
        assert!(db.create_table("flags", &[("on", "boolean")]).is_err());

        db.insert("flags", &[Value::Boolean(true), Value::Long(1 << 40)])?;
        assert_eq!(
            db.select("flags", &["count"])?,
            vec![vec![Value::Long(1 << 40)]]
        );
        assert_eq!(db.catalog().list_tables().len(), 1);

        db.close()?;
        Ok(())
    }

    #[test]
    fn test_reopen_sees_earlier_tables() -> Result<()> {
        let dir = tempdir()?;
        let payload = "r".repeat(300);
        {
            let db = Database::open(dir.path(), quiet_config())?;
            db.create_table("t", &[("id", "integer"), ("body", "varchar")])?;
            for i in 0..100 {
                db.insert("t", &[Value::Integer(i), Value::Text(payload.clone())])?;
            }
            db.close()?;
        }

        let db = Database::open(dir.path(), quiet_config())?;
        let ids: Vec<_> = db
            .select("t", &["id"])?
            .into_iter()
            .map(|row| row[0].clone())
            .collect();
        assert_eq!(ids, (0..100).map(Value::Integer).collect::<Vec<_>>());

        // Later inserts extend the same table and new tables get fresh pages
        let table = db.catalog().table("t")?;
        let before = db.catalog().table_pages(&table)?;
        db.insert("t", &[Value::Integer(100), Value::Text(payload.clone())])?;
        db.create_table("u", &[("flag", "boolean")])?;
        let page = db.insert("u", &[Value::Boolean(true)])?;
        assert!(!before.contains(&page));
        assert_eq!(db.select("t", &[])?.len(), 101);
        db.close()?;

        let db = Database::open(dir.path(), quiet_config())?;
        assert_eq!(db.select("u", &[])?, vec![vec![Value::Boolean(true)]]);
        assert_eq!(db.catalog().list_tables().len(), 2);
        db.close()?;
        Ok(())
    }

    #[test]
    fn test_unflushed_pages_are_not_reused() -> Result<()> {
        let dir = tempdir()?;
        {
            let catalog = Catalog::open(dir.path())?;
            catalog.create_table("t", &[("id", "integer")])?;
            // The directory knows page 5 even though heap.dat was never written
            catalog.add_table_page("t", PageId(5))?;
        }

        let db = Database::open(dir.path(), quiet_config())?;
        db.create_table("u", &[("id", "integer")])?;
        assert_eq!(db.insert("u", &[Value::Integer(1)])?, PageId(6));
        db.close()?;
        Ok(())
    }
}
