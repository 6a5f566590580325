//! Buffer Pool - the LRU page cache between the index and the space files.
//!
//! The [`BufferPool`] provides:
//! - Page caching keyed by `(space id, page number)`
//! - Strict least-recently-used eviction with write-back of dirty victims
//! - A dirty list ordered by the time each page was last dirtied
//! - Threshold-triggered batch write-back of the oldest dirty pages

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;

use crate::buffer::{BufferPoolStats, StatsSnapshot};
use crate::common::config::{DEFAULT_DIRTY_RATIO, DEFAULT_POOL_CAPACITY};
use crate::common::{EngineConfig, Error, GlobalPageId, Result, SpaceId};
use crate::storage::page::{Page, PageType};
use crate::storage::SpaceManager;

/// Cache map plus dirty list, guarded together.
struct PoolState {
    /// Every cached page, in recency order.
    cache: LruCache<GlobalPageId, Page>,
    /// Ids of cached pages with unflushed changes. Used as an ordered set:
    /// re-dirtying a page moves it to the tail, `pop_lru` yields the oldest.
    dirty: LruCache<GlobalPageId, ()>,
}

/// LRU cache of decoded pages with deferred write-back.
///
/// # Architecture
/// ```text
/// ┌────────────────────────────────────────────────────────┐
/// │                       BufferPool                       │
/// │  ┌──────────────────────────┐  ┌────────────────────┐  │
/// │  │ cache: LruCache          │  │ dirty: LruCache    │  │
/// │  │ GlobalPageId → Page      │  │ GlobalPageId → ()  │  │
/// │  └──────────────────────────┘  └────────────────────┘  │
/// │                 │ miss / write-back                    │
/// │                 ▼                                      │
/// │        Arc<SpaceManager> (one file per space)          │
/// └────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// Cache and dirty list sit behind one `RwLock`. Cache hits do not share a
/// read lock: they take the write lock like every other operation, because
/// `LruCache::get` moves the entry in the LRU order and needs `&mut`. Page
/// reads therefore run one at a time; only introspection such as
/// [`BufferPool::len`] shares the read lock. Write-back of an evicted or
/// flushed page happens while the lock is held, so no other thread can
/// observe a page that is neither cached nor on disk.
///
/// Pages are handed out as copies. A caller that changes a page must hand it
/// back with [`BufferPool::put_page`].
pub struct BufferPool {
    spaces: Arc<SpaceManager>,
    state: RwLock<PoolState>,
    capacity: usize,
    dirty_ratio: f64,
    sync_on_flush: bool,
    stats: BufferPoolStats,
}

impl BufferPool {
    /// Create a pool holding at most `capacity` pages (0 selects the default).
    pub fn new(spaces: Arc<SpaceManager>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_POOL_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            spaces,
            state: RwLock::new(PoolState {
                cache: LruCache::new(capacity),
                dirty: LruCache::unbounded(),
            }),
            capacity: capacity.get(),
            dirty_ratio: DEFAULT_DIRTY_RATIO,
            sync_on_flush: false,
            stats: BufferPoolStats::new(),
        }
    }

    /// Create a pool sized and tuned from `config`.
    pub fn with_config(spaces: Arc<SpaceManager>, config: &EngineConfig) -> Self {
        Self::new(spaces, config.pool_capacity)
            .with_dirty_ratio(config.dirty_ratio)
            .with_sync_on_flush(config.sync_on_flush)
    }

    pub fn with_dirty_ratio(mut self, dirty_ratio: f64) -> Self {
        self.dirty_ratio = dirty_ratio;
        self
    }

    pub fn with_sync_on_flush(mut self, sync_on_flush: bool) -> Self {
        self.sync_on_flush = sync_on_flush;
        self
    }

    pub fn spaces(&self) -> &Arc<SpaceManager> {
        &self.spaces
    }

    // ========================================================================
    // Public API: read and write pages
    // ========================================================================

    /// Return a copy of a page, loading it through the space manager on a miss.
    ///
    /// A miss that finds the pool full first evicts the least-recently-used
    /// page, writing it back if it is dirty.
    ///
    /// # Errors
    /// Read errors from the space manager, or write-back errors from eviction.
    pub fn get_page(&self, page_id: GlobalPageId) -> Result<Page> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if let Some(page) = state.cache.get(&page_id) {
            self.stats.record_hit();
            return Ok(page.clone());
        }

        self.stats.record_miss();
        let page = self.spaces.read_page(page_id)?;
        self.make_room(state)?;
        state.cache.put(page_id, page.clone());
        Ok(page)
    }

    /// Insert or replace the cached copy of `page` in `space_id`.
    ///
    /// A dirty page moves to the tail of the dirty list. Once more than
    /// `dirty_ratio × capacity` pages are dirty, the oldest half of them is
    /// written back before returning.
    ///
    /// # Errors
    /// Write-back errors from eviction or the threshold flush.
    pub fn put_page(&self, page: Page, space_id: SpaceId) -> Result<()> {
        let page_id = GlobalPageId::new(space_id, page.page_no());

        let dirty_count = {
            let mut guard = self.state.write();
            let state = &mut *guard;

            if !state.cache.contains(&page_id) {
                self.make_room(state)?;
            }

            if page.is_dirty() {
                state.dirty.push(page_id, ());
            } else {
                state.dirty.pop(&page_id);
            }
            state.cache.put(page_id, page);
            state.dirty.len()
        };

        if dirty_count > self.dirty_threshold() {
            let batch = (dirty_count / 2).max(1);
            tracing::debug!(dirty = dirty_count, batch, "dirty threshold crossed");
            self.stats.record_batch_flush();
            self.flush_batch(batch)?;
        }
        Ok(())
    }

    /// Allocate a fresh page of `page_type` in `space_id`.
    ///
    /// The returned page is dirty and not yet cached; hand it to
    /// [`BufferPool::put_page`] once filled. Any stale cached copy of the
    /// reused page number is dropped.
    pub fn new_page(&self, space_id: SpaceId, page_type: PageType) -> Result<Page> {
        let page_no = self.spaces.allocate_page(space_id)?;
        self.discard(GlobalPageId::new(space_id, page_no));
        Ok(Page::with_type(page_no, page_type))
    }

    /// Drop a page from the pool without writing it back.
    ///
    /// Returns whether a cached copy existed.
    pub fn discard(&self, page_id: GlobalPageId) -> bool {
        let mut state = self.state.write();
        state.dirty.pop(&page_id);
        state.cache.pop(&page_id).is_some()
    }

    /// Discard a page and return it to its space's free chain.
    pub fn free_page(&self, page_id: GlobalPageId) -> Result<()> {
        self.discard(page_id);
        self.spaces.free_page(page_id)
    }

    // ========================================================================
    // Public API: write-back
    // ========================================================================

    /// Write every dirty page back and empty the dirty list.
    pub fn flush(&self) -> Result<()> {
        let written = self.flush_where(usize::MAX, |_| true)?;
        tracing::debug!(pages = written, "flushed buffer pool");
        Ok(())
    }

    /// Write back up to `n` dirty pages, oldest-dirtied first.
    ///
    /// Returns the number of pages written.
    pub fn flush_batch(&self, n: usize) -> Result<usize> {
        let written = self.flush_where(n, |_| true)?;
        tracing::debug!(pages = written, "flushed dirty batch");
        Ok(written)
    }

    /// Write back every dirty page belonging to `space_id`.
    pub fn flush_space(&self, space_id: SpaceId) -> Result<usize> {
        self.flush_where(usize::MAX, |id| id.space_id == space_id)
    }

    /// Evict the least-recently-used page, writing it back first if dirty.
    ///
    /// Returns the evicted page id, or `None` if the pool is empty.
    pub fn evict_lru(&self) -> Result<Option<GlobalPageId>> {
        let mut guard = self.state.write();
        self.evict_locked(&mut guard)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.read().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dirty_count(&self) -> usize {
        self.state.read().dirty.len()
    }

    /// Whether a page is cached. Does not affect LRU order.
    pub fn contains(&self, page_id: GlobalPageId) -> bool {
        self.state.read().cache.contains(&page_id)
    }

    /// Whether a page is on the dirty list.
    pub fn is_dirty(&self, page_id: GlobalPageId) -> bool {
        self.state.read().dirty.contains(&page_id)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn dirty_threshold(&self) -> usize {
        (self.capacity as f64 * self.dirty_ratio) as usize
    }

    /// Evict until one more page fits.
    fn make_room(&self, state: &mut PoolState) -> Result<()> {
        while state.cache.len() >= self.capacity {
            if self.evict_locked(state)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn evict_locked(&self, state: &mut PoolState) -> Result<Option<GlobalPageId>> {
        let Some((&page_id, page)) = state.cache.peek_lru() else {
            return Ok(None);
        };

        if state.dirty.contains(&page_id) {
            self.spaces.write_page(page_id.space_id, page)?;
            self.stats.record_write();
            state.dirty.pop(&page_id);
        }

        state.cache.pop_lru();
        self.stats.record_eviction();
        tracing::debug!(page = %page_id, "evicted page");
        Ok(Some(page_id))
    }

    /// Write back up to `limit` dirty pages matching `filter`, oldest first.
    fn flush_where<F>(&self, limit: usize, filter: F) -> Result<usize>
    where
        F: Fn(&GlobalPageId) -> bool,
    {
        let mut guard = self.state.write();
        let state = &mut *guard;

        // LruCache iterates most-recent first.
        let targets: Vec<GlobalPageId> = state
            .dirty
            .iter()
            .rev()
            .map(|(id, _)| *id)
            .filter(|id| filter(id))
            .take(limit)
            .collect();

        let mut touched = BTreeSet::new();
        for page_id in &targets {
            self.write_back(state, *page_id)?;
            touched.insert(page_id.space_id);
        }

        if self.sync_on_flush {
            for space_id in touched {
                self.spaces.sync(space_id)?;
            }
        }
        Ok(targets.len())
    }

    /// Write one dirty page and mark it clean. The page stays cached.
    fn write_back(&self, state: &mut PoolState, page_id: GlobalPageId) -> Result<()> {
        let page = state
            .cache
            .peek_mut(&page_id)
            .ok_or(Error::PageNotFound(page_id))?;
        self.spaces.write_page(page_id.space_id, page)?;
        page.clear_dirty();
        self.stats.record_write();
        state.dirty.pop(&page_id);
        Ok(())
    }
}
