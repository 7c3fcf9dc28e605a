use crate::storage::page::PageId;
use clap::ValueEnum;
use std::fmt::Debug;

use super::clock::ClockReplacer;
use super::lru::LruReplacer;

/// Eviction-order policy over the pages that are currently unpinned.
/// Tracks identity and ordering only, never page content.
pub trait Replacer: Send + Sync + Debug {
    /// Register a page as evictable, or refresh its recency if it already is.
    fn push(&mut self, page_id: PageId);

    /// Remove and return the next page to evict. Returns None if no page can
    /// be evicted.
    fn pick_victim(&mut self) -> Option<PageId>;

    /// Drop a page from eligibility without treating it as evicted.
    fn delete(&mut self, page_id: PageId);

    /// Get the number of evictable pages.
    fn size(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReplacerKind {
    #[default]
    Clock,
    Lru,
}

impl ReplacerKind {
    pub fn build(self) -> Box<dyn Replacer> {
        match self {
            ReplacerKind::Clock => Box::new(ClockReplacer::new()),
            ReplacerKind::Lru => Box::new(LruReplacer::new()),
        }
    }
}
