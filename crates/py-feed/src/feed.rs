//! # Feed Controller
//!
//! Owns the loaded item sequence, the continuation cursor and the pagination
//! flags. Page loads are strictly sequential: a load request while another is
//! in flight, or after the store reported the last page, is a no-op.
//!
//! The lock is never held across an await; every remote call happens between
//! two short critical sections. A page result that arrives after a reset
//! belongs to a previous epoch and is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use py_core::{Item, ItemId, ItemStore, PageCursor, Result};

use crate::entry::{DeltaId, FeedEntry, PendingDelta};
use crate::remote::{bounded, RemoteOp};

/// What a page request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// `n` items were stored (replacing on a first page, appending otherwise).
    Loaded(usize),
    /// A load was already in flight, or no more pages exist.
    Skipped,
    /// The feed was reset while the request was outstanding.
    Discarded,
}

#[derive(Debug)]
struct FeedState {
    entries: Vec<FeedEntry>,
    cursor: Option<PageCursor>,
    has_more: bool,
    in_flight: bool,
    epoch: u64,
}

impl FeedState {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            has_more: true,
            in_flight: false,
            epoch: 0,
        }
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.has_more = true;
        self.in_flight = false;
        self.epoch += 1;
    }

    fn append(&mut self, items: Vec<Item>, page_size: usize) -> usize {
        let count = items.len();
        self.has_more = count == page_size;
        if let Some(last) = items.last() {
            self.cursor = Some(PageCursor::after(last));
        }
        self.entries.extend(items.into_iter().map(FeedEntry::new));
        count
    }

    fn entry_mut(&mut self, id: &ItemId) -> Option<&mut FeedEntry> {
        self.entries.iter_mut().find(|e| &e.visible().id == id)
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag if the request is dropped before it resolves.
struct InFlight<'a> {
    state: &'a Mutex<FeedState>,
    epoch: u64,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) -> u64 {
        self.armed = false;
        self.epoch
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(self.state);
        if state.epoch == self.epoch {
            state.in_flight = false;
        }
    }
}

/// Paginated, reverse-chronological view over the item store.
#[derive(Clone)]
pub struct FeedController {
    store: Arc<dyn ItemStore>,
    state: Arc<Mutex<FeedState>>,
    remote_timeout: Duration,
}

impl FeedController {
    pub fn new(store: Arc<dyn ItemStore>, remote_timeout: Duration) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(FeedState::new())),
            remote_timeout,
        }
    }

    /// Discards the loaded sequence and fetches the newest `page_size` items.
    ///
    /// On failure the feed stays empty with "more" set, so a later load can retry.
    pub async fn load_first_page(&self, page_size: usize) -> Result<PageLoad> {
        let epoch = {
            let mut state = lock(&self.state);
            state.reset();
            state.in_flight = true;
            state.epoch
        };
        let guard = InFlight { state: &self.state, epoch, armed: true };

        debug!(page_size, epoch, "loading first page");
        let result = bounded(
            self.remote_timeout,
            RemoteOp::Read,
            "query items page",
            self.store.query_items_page(page_size, None),
        )
        .await;

        self.finish(guard, page_size, result)
    }

    /// Appends the next `page_size` items after the cursor.
    pub async fn load_next_page(&self, page_size: usize) -> Result<PageLoad> {
        let (epoch, cursor) = {
            let mut state = lock(&self.state);
            if state.in_flight || !state.has_more {
                return Ok(PageLoad::Skipped);
            }
            state.in_flight = true;
            (state.epoch, state.cursor.clone())
        };
        let guard = InFlight { state: &self.state, epoch, armed: true };

        debug!(page_size, epoch, after = ?cursor.as_ref().map(|c| c.item_id().to_string()), "loading next page");
        let result = bounded(
            self.remote_timeout,
            RemoteOp::Read,
            "query items page",
            self.store.query_items_page(page_size, cursor),
        )
        .await;

        self.finish(guard, page_size, result)
    }

    fn finish(&self, guard: InFlight<'_>, page_size: usize, result: Result<Vec<Item>>) -> Result<PageLoad> {
        let epoch = guard.disarm();

        let mut state = lock(&self.state);
        if state.epoch != epoch {
            warn!(epoch, current = state.epoch, "discarding page that arrived after a reset");
            return Ok(PageLoad::Discarded);
        }

        // Cleared under the same lock as the append so no load can start from a stale cursor.
        state.in_flight = false;
        let items = result?;
        let count = state.append(items, page_size);
        debug!(count, total = state.entries.len(), has_more = state.has_more, "page stored");
        Ok(PageLoad::Loaded(count))
    }

    /// Clears everything without fetching.
    pub fn reset(&self) {
        lock(&self.state).reset();
    }

    /// Visible items in load order.
    pub fn items(&self) -> Vec<Item> {
        lock(&self.state).entries.iter().map(|e| e.visible().clone()).collect()
    }

    pub fn item(&self, id: &ItemId) -> Option<Item> {
        let state = lock(&self.state);
        state.entries.iter().find(|e| &e.visible().id == id).map(|e| e.visible().clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_more(&self) -> bool {
        lock(&self.state).has_more
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).in_flight
    }

    /// Item-level write access for the mutation coordinator.
    pub fn handle(&self) -> FeedHandle {
        FeedHandle { state: Arc::clone(&self.state) }
    }
}

/// Restricted view of a feed: may mutate loaded items, never the cursor or
/// the pagination flags.
#[derive(Clone)]
pub struct FeedHandle {
    state: Arc<Mutex<FeedState>>,
}

/// An entry taken out of the feed, with the position it held.
#[derive(Debug)]
pub struct RemovedEntry {
    index: usize,
    entry: FeedEntry,
}

impl FeedHandle {
    pub fn visible(&self, id: &ItemId) -> Option<Item> {
        let state = lock(&self.state);
        state.entries.iter().find(|e| &e.visible().id == id).map(|e| e.visible().clone())
    }

    /// Applies `delta` locally; `None` when the item is not loaded.
    pub fn push(&self, id: &ItemId, delta: PendingDelta) -> Option<DeltaId> {
        lock(&self.state).entry_mut(id).map(|e| e.push(delta))
    }

    pub fn confirm(&self, id: &ItemId, delta: DeltaId) {
        if let Some(entry) = lock(&self.state).entry_mut(id) {
            entry.confirm(delta);
        }
    }

    pub fn confirm_like(&self, id: &ItemId, delta: DeltaId, liked: bool) {
        if let Some(entry) = lock(&self.state).entry_mut(id) {
            entry.confirm_like(delta, liked);
        }
    }

    pub fn discard(&self, id: &ItemId, delta: DeltaId) {
        if let Some(entry) = lock(&self.state).entry_mut(id) {
            entry.discard(delta);
        }
    }

    /// Installs a re-fetched authoritative copy if the item is still loaded.
    pub fn refresh(&self, item: Item) {
        if let Some(entry) = lock(&self.state).entry_mut(&item.id) {
            entry.refresh(item);
        }
    }

    /// Replaces a loaded item outright (after the author edited it).
    pub fn replace(&self, item: Item) {
        if let Some(entry) = lock(&self.state).entry_mut(&item.id) {
            *entry = FeedEntry::new(item);
        }
    }

    pub fn remove(&self, id: &ItemId) -> Option<RemovedEntry> {
        let mut state = lock(&self.state);
        let index = state.entries.iter().position(|e| &e.visible().id == id)?;
        let entry = state.entries.remove(index);
        Some(RemovedEntry { index, entry })
    }

    /// Puts a removed entry back where it was.
    pub fn restore(&self, removed: RemovedEntry) {
        let mut state = lock(&self.state);
        let index = removed.index.min(state.entries.len());
        state.entries.insert(index, removed.entry);
    }
}
