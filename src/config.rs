use crate::storage::{ReplacerKind, WriterConfig};

/// Settings for opening a [`Database`](crate::database::Database).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Number of pages the buffer pool holds
    pub pool_capacity: usize,
    pub replacer: ReplacerKind,
    pub writer: WriterConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 64,
            replacer: ReplacerKind::default(),
            writer: WriterConfig::default(),
        }
    }
}
