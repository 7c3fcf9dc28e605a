use super::replacer::Replacer;
use crate::storage::page::PageId;
use hashlink::LinkedHashMap;

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Evictable pages in recency order, least recently used at the front.
    /// A linked list plus a hash index, so every operation is O(1).
    order: LinkedHashMap<PageId, ()>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            order: LinkedHashMap::new(),
        }
    }
}

impl Replacer for LruReplacer {
    fn push(&mut self, page_id: PageId) {
        // Re-pushing moves the page to the most recently used end
        if self.order.to_back(&page_id).is_none() {
            self.order.insert(page_id, ());
        }
    }

    fn pick_victim(&mut self) -> Option<PageId> {
        self.order.pop_front().map(|(page_id, _)| page_id)
    }

    fn delete(&mut self, page_id: PageId) {
        self.order.remove(&page_id);
    }

    fn size(&self) -> usize {
        self.order.len()
    }
}
