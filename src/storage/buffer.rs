pub mod clock;
pub mod lru;
pub mod replacer;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, Page, PageId};
use crate::storage::PageFileManager;
use log::{debug, warn};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use replacer::Replacer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One pool entry: a resident page plus its pin and dirty bookkeeping.
#[derive(Debug)]
pub struct BufferSlot {
    page: HeapPage,
    pin_count: u32,
    /// Sequence number of the write that first dirtied the slot since its
    /// last flush. `None` while clean.
    dirtied_at: Option<u64>,
}

impl BufferSlot {
    fn new(page: HeapPage) -> Self {
        Self {
            page,
            pin_count: 0,
            dirtied_at: None,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id()
    }

    pub fn page(&self) -> &HeapPage {
        &self.page
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_at.is_some()
    }

    fn mark_dirty(&mut self, seq: u64) {
        if self.dirtied_at.is_none() {
            self.dirtied_at = Some(seq);
        }
    }
}

/// Shared handle to a resident slot. Holders see later pin and dirty
/// changes; once the page is evicted the handle is detached from the pool.
/// Do not hold a slot lock across calls into the pool.
pub type SlotRef = Arc<RwLock<BufferSlot>>;

#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    state: Mutex<PoolState>,
    file_manager: PageFileManager,
    path: PathBuf,
    capacity: usize,
}

/// Everything that must change atomically: lookup, eviction decision and
/// slot mutation all happen under this one lock.
struct PoolState {
    slots: HashMap<PageId, SlotRef>,
    replacer: Box<dyn Replacer>,
    dirty_seq: u64,
    /// First page id never handed out by `new_page`
    next_page_id: u64,
}

impl PoolState {
    fn next_dirty_seq(&mut self) -> u64 {
        self.dirty_seq += 1;
        self.dirty_seq
    }
}

impl BufferPoolManager {
    pub fn new(
        capacity: usize,
        file_manager: PageFileManager,
        replacer: Box<dyn Replacer>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                state: Mutex::new(PoolState {
                    slots: HashMap::with_capacity(capacity),
                    replacer,
                    dirty_seq: 0,
                    next_page_id: 0,
                }),
                file_manager,
                path: path.into(),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn resident_count(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.state.lock().slots.contains_key(&page_id)
    }

    /// Returns the slot for `page_id`, loading it on a miss. Does not pin;
    /// use [`fetch_page`](Self::fetch_page) or [`pin_page`](Self::pin_page)
    /// to keep the page resident.
    pub fn get_page(&self, page_id: PageId) -> StorageResult<SlotRef> {
        let mut state = self.inner.state.lock();
        self.lookup_or_load(&mut state, page_id)
    }

    /// Returns the page pinned for the lifetime of the guard.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<PinnedPage> {
        let mut state = self.inner.state.lock();
        let slot = self.lookup_or_load(&mut state, page_id)?;
        Self::pin_slot(&mut state, page_id, &slot);
        drop(state);

        Ok(PinnedPage {
            pool: self.clone(),
            page_id,
            slot,
        })
    }

    /// Allocates a page id past every page on disk or in the pool and makes
    /// it resident as an empty, dirty page.
    pub fn new_page(&self) -> StorageResult<PageId> {
        let mut state = self.inner.state.lock();

        let on_disk = self.inner.file_manager.num_pages(&self.inner.path)?;
        let resident = state
            .slots
            .keys()
            .map(|id| u64::from(id.0) + 1)
            .max()
            .unwrap_or(0);
        let next = u64::from(on_disk).max(resident).max(state.next_page_id);
        let page_id = u32::try_from(next)
            .map(PageId)
            .map_err(|_| StorageError::PageIdsExhausted)?;

        self.make_room(&mut state)?;
        let mut slot = BufferSlot::new(HeapPage::new(page_id));
        let seq = state.next_dirty_seq();
        slot.mark_dirty(seq);

        state.slots.insert(page_id, Arc::new(RwLock::new(slot)));
        state.replacer.push(page_id);
        state.next_page_id = next + 1;
        debug!("allocated page {}", page_id);

        Ok(page_id)
    }

    /// Makes sure `new_page` never hands out `page_id` or anything before it,
    /// even if those pages never reached the file.
    pub fn reserve_page_id(&self, page_id: PageId) {
        let mut state = self.inner.state.lock();
        state.next_page_id = state.next_page_id.max(u64::from(page_id.0) + 1);
    }

    /// Replaces a resident page's content and marks it dirty.
    pub fn update_page(&self, page_id: PageId, page: HeapPage) -> StorageResult<()> {
        if page.page_id() != page_id {
            return Err(StorageError::PageIdMismatch {
                expected: page_id,
                found: page.page_id(),
            });
        }

        let mut state = self.inner.state.lock();
        let slot = state
            .slots
            .get(&page_id)
            .cloned()
            .ok_or(StorageError::PageNotResident(page_id))?;

        let seq = state.next_dirty_seq();
        let mut slot = slot.write();
        slot.page = page;
        slot.mark_dirty(seq);
        Ok(())
    }

    pub fn pin_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        let slot = state
            .slots
            .get(&page_id)
            .cloned()
            .ok_or(StorageError::PageNotResident(page_id))?;
        Self::pin_slot(&mut state, page_id, &slot);
        Ok(())
    }

    pub fn unpin_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        let slot = state
            .slots
            .get(&page_id)
            .cloned()
            .ok_or(StorageError::PageNotResident(page_id))?;

        let mut slot = slot.write();
        if slot.pin_count == 0 {
            return Err(StorageError::NotPinned(page_id));
        }
        slot.pin_count -= 1;
        if slot.pin_count == 0 {
            state.replacer.push(page_id);
        }
        Ok(())
    }

    /// Writes the page if it is resident and dirty. Returns whether a write
    /// happened.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<bool> {
        let state = self.inner.state.lock();
        match state.slots.get(&page_id) {
            Some(slot) => self.flush_slot(slot),
            None => Ok(false),
        }
    }

    /// Flushes every dirty slot, oldest first. Returns how many were written.
    pub fn flush_all_pages(&self) -> StorageResult<usize> {
        let state = self.inner.state.lock();
        let mut flushed = 0;
        for page_id in Self::dirty_in_order(&state) {
            if let Some(slot) = state.slots.get(&page_id) {
                if self.flush_slot(slot)? {
                    flushed += 1;
                }
            }
        }
        Ok(flushed)
    }

    /// Snapshot of dirty page ids, ordered by when each was first dirtied.
    pub fn get_dirty_pages(&self) -> Vec<PageId> {
        let state = self.inner.state.lock();
        Self::dirty_in_order(&state)
    }

    fn dirty_in_order(state: &PoolState) -> Vec<PageId> {
        let mut dirty: Vec<(u64, PageId)> = state
            .slots
            .iter()
            .filter_map(|(page_id, slot)| slot.read().dirtied_at.map(|seq| (seq, *page_id)))
            .collect();
        dirty.sort_unstable();
        dirty.into_iter().map(|(_, page_id)| page_id).collect()
    }

    fn flush_slot(&self, slot: &SlotRef) -> StorageResult<bool> {
        let mut slot = slot.write();
        if !slot.is_dirty() {
            return Ok(false);
        }
        self.inner.file_manager.write(&slot.page, &self.inner.path)?;
        slot.dirtied_at = None;
        Ok(true)
    }

    fn pin_slot(state: &mut PoolState, page_id: PageId, slot: &SlotRef) {
        let mut slot = slot.write();
        slot.pin_count += 1;
        if slot.pin_count == 1 {
            state.replacer.delete(page_id);
        }
    }

    fn lookup_or_load(&self, state: &mut PoolState, page_id: PageId) -> StorageResult<SlotRef> {
        if let Some(slot) = state.slots.get(&page_id).cloned() {
            if !slot.read().is_pinned() {
                state.replacer.push(page_id);
            }
            return Ok(slot);
        }

        self.make_room(state)?;
        let page = self.inner.file_manager.read(page_id, &self.inner.path)?;
        let slot = Arc::new(RwLock::new(BufferSlot::new(page)));
        state.slots.insert(page_id, slot.clone());
        state.replacer.push(page_id);
        debug!("loaded page {} into the pool", page_id);

        Ok(slot)
    }

    /// Evicts one unpinned slot if the pool is at capacity, flushing it
    /// first when dirty.
    fn make_room(&self, state: &mut PoolState) -> StorageResult<()> {
        while state.slots.len() >= self.inner.capacity {
            let victim = state
                .replacer
                .pick_victim()
                .ok_or(StorageError::BufferPoolFull {
                    capacity: self.inner.capacity,
                })?;

            let Some(slot) = state.slots.get(&victim).cloned() else {
                warn!("replacer offered page {} which is not resident", victim);
                continue;
            };
            if slot.read().is_pinned() {
                warn!("replacer offered pinned page {}, skipping", victim);
                continue;
            }

            if let Err(e) = self.flush_slot(&slot) {
                // Keep the page and its data, it stays evictable
                state.replacer.push(victim);
                return Err(e);
            }
            state.slots.remove(&victim);
            debug!("evicted page {}", victim);
        }
        Ok(())
    }
}

/// A page pinned in the pool. Unpins on drop.
pub struct PinnedPage {
    pool: BufferPoolManager,
    page_id: PageId,
    slot: SlotRef,
}

impl PinnedPage {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn slot(&self) -> &SlotRef {
        &self.slot
    }

    pub fn page(&self) -> MappedRwLockReadGuard<'_, HeapPage> {
        RwLockReadGuard::map(self.slot.read(), |slot| &slot.page)
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        if let Err(e) = self.pool.unpin_page(self.page_id) {
            warn!("failed to unpin page {}: {}", self.page_id, e);
        }
    }
}
