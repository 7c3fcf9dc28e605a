use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct ClockEntry {
    page_id: PageId,
    referenced: bool,
}

/// Second-chance replacer. Entries sit on a ring swept by a hand; a page
/// pushed again while already tracked gets its reference bit set and is
/// skipped once by the sweep.
#[derive(Debug, Default)]
pub struct ClockReplacer {
    ring: Vec<Option<ClockEntry>>,
    /// Ring position of every tracked page
    positions: HashMap<PageId, usize>,
    /// Holes left in the ring by evicted or deleted pages
    free: Vec<usize>,
    hand: usize,
}

impl ClockReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(&mut self) {
        self.hand = (self.hand + 1) % self.ring.len();
    }

    fn vacate(&mut self, pos: usize) {
        if let Some(entry) = self.ring[pos].take() {
            self.positions.remove(&entry.page_id);
            self.free.push(pos);
        }
    }
}

impl Replacer for ClockReplacer {
    fn push(&mut self, page_id: PageId) {
        if let Some(&pos) = self.positions.get(&page_id) {
            if let Some(entry) = self.ring[pos].as_mut() {
                entry.referenced = true;
            }
            return;
        }

        let entry = ClockEntry {
            page_id,
            referenced: false,
        };
        let pos = match self.free.pop() {
            Some(pos) => {
                self.ring[pos] = Some(entry);
                pos
            }
            None => {
                self.ring.push(Some(entry));
                self.ring.len() - 1
            }
        };
        self.positions.insert(page_id, pos);
    }

    fn pick_victim(&mut self) -> Option<PageId> {
        if self.positions.is_empty() {
            return None;
        }

        // Two sweeps are enough: the first clears every reference bit
        for _ in 0..2 * self.ring.len() {
            let pos = self.hand;
            self.advance();
            match self.ring[pos].as_mut() {
                Some(entry) if entry.referenced => entry.referenced = false,
                Some(entry) => {
                    let page_id = entry.page_id;
                    self.vacate(pos);
                    return Some(page_id);
                }
                None => {}
            }
        }
        None
    }

    fn delete(&mut self, page_id: PageId) {
        if let Some(&pos) = self.positions.get(&page_id) {
            self.vacate(pos);
        }
    }

    fn size(&self) -> usize {
        self.positions.len()
    }
}
