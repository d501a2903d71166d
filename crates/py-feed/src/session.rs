//! # Catalog session
//!
//! One visitor's catalog: the identity snapshot channel, the filter state, the
//! active tab, a feed controller and its per-tab loaders. Mutations go through
//! the shared coordinator with the current viewer snapshot passed explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use py_core::{
    AppError, Comment, CommentId, FilterState, ImageUpload, Item, ItemDraft, ItemId, Result, Tab,
    Viewer,
};

use crate::feed::{FeedController, PageLoad};
use crate::loader::{Sentinel, TabLoaders};
use crate::mutations::{Confirmation, DeleteOutcome, MutationCoordinator};
use crate::share::SharePayload;

#[derive(Debug, Default)]
struct SessionView {
    filter: FilterState,
    active_tab: Tab,
}

/// The filtered contents of one tab.
#[derive(Debug, Clone)]
pub struct TabView {
    pub tab: Tab,
    pub items: Vec<Item>,
    pub sentinel: Option<Sentinel>,
}

/// Everything a catalog page renders.
#[derive(Debug, Clone)]
pub struct CatalogView {
    pub viewer: Option<Viewer>,
    pub filter: FilterState,
    pub active_tab: Tab,
    pub tabs: Vec<TabView>,
}

impl CatalogView {
    pub fn active(&self) -> Option<&TabView> {
        self.tabs.iter().find(|t| t.tab == self.active_tab)
    }
}

pub struct CatalogSession {
    viewer: watch::Receiver<Option<Viewer>>,
    view: Mutex<SessionView>,
    feed: FeedController,
    loaders: TabLoaders,
    coordinator: Arc<MutationCoordinator>,
    entered: AtomicBool,
}

impl CatalogSession {
    pub fn new(coordinator: Arc<MutationCoordinator>, viewer: watch::Receiver<Option<Viewer>>) -> Self {
        let feed = FeedController::new(
            Arc::clone(&coordinator.ports().store),
            coordinator.settings().remote_timeout,
        );
        Self {
            viewer,
            view: Mutex::new(SessionView::default()),
            feed,
            loaders: TabLoaders::new(),
            coordinator,
            entered: AtomicBool::new(false),
        }
    }

    fn view(&self) -> MutexGuard<'_, SessionView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn page_size(&self) -> usize {
        self.coordinator.settings().page_size
    }

    /// Current identity snapshot.
    pub fn viewer(&self) -> Option<Viewer> {
        self.viewer.borrow().clone()
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    /// Fresh entry into the catalog: attach the loaders and reload from the top.
    pub async fn enter(&self) -> Result<PageLoad> {
        self.loaders.attach_all();
        self.entered.store(true, Ordering::Release);
        self.feed.load_first_page(self.page_size()).await
    }

    /// The catalog went out of view. In-flight loads still land in the feed.
    pub fn leave(&self) {
        self.loaders.detach_all();
        self.entered.store(false, Ordering::Release);
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// Installs new filter criteria and active tab. Criteria that change the
    /// remote result set reset the feed and reload the first page; a search
    /// term change only narrows the loaded items.
    pub async fn apply_filters(&self, mut next: FilterState, tab: Tab) -> Result<Option<PageLoad>> {
        next.viewer_id = self.viewer().map(|v| v.uid);
        let reset = {
            let mut view = self.view();
            let reset = view.filter.requires_reset(&next);
            view.filter = next;
            view.active_tab = tab;
            reset
        };

        if !self.is_entered() {
            return self.enter().await.map(Some);
        }
        if reset {
            debug!(tab = tab.as_str(), "filter change resets the feed");
            return self.feed.load_first_page(self.page_size()).await.map(Some);
        }
        Ok(None)
    }

    pub fn set_tab(&self, tab: Tab) {
        self.view().active_tab = tab;
    }

    pub fn active_tab(&self) -> Tab {
        self.view().active_tab
    }

    /// The sentinel of `tab` scrolled into view.
    pub async fn load_more(&self, tab: Tab) -> Result<PageLoad> {
        let active = self.active_tab();
        self.loaders
            .get(tab)
            .on_sentinel_visible(active, &self.feed, self.page_size())
            .await
    }

    pub fn catalog(&self) -> CatalogView {
        let viewer = self.viewer();
        let (mut filter, active_tab) = {
            let view = self.view();
            (view.filter.clone(), view.active_tab)
        };
        filter.viewer_id = viewer.as_ref().map(|v| v.uid.clone());

        let settings = self.coordinator.settings();
        let now = settings.local(self.coordinator.ports().clock.now());
        let items = self.feed.items();

        let tabs = Tab::ALL
            .into_iter()
            .map(|tab| {
                let visible: Vec<Item> = filter.tab_view(&items, tab, now).into_iter().cloned().collect();
                let sentinel = self.loaders.get(tab).sentinel(visible.len(), &self.feed);
                TabView { tab, items: visible, sentinel }
            })
            .collect();

        CatalogView { viewer, filter, active_tab, tabs }
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    pub async fn toggle_like(&self, item_id: &ItemId) -> Result<bool> {
        let viewer = self.viewer();
        self.coordinator
            .toggle_like(&self.feed.handle(), viewer.as_ref(), item_id)
            .await
    }

    pub async fn add_comment(&self, item_id: &ItemId, text: &str, anonymous: bool) -> Result<Comment> {
        let viewer = self.viewer();
        self.coordinator
            .add_comment(&self.feed.handle(), viewer.as_ref(), item_id, text, anonymous)
            .await
    }

    pub async fn delete_comment(&self, item_id: &ItemId, comment_id: &CommentId) -> Result<()> {
        let viewer = self.viewer();
        self.coordinator
            .delete_comment(&self.feed.handle(), viewer.as_ref(), item_id, comment_id)
            .await
    }

    /// Deletes an item; a failed remote delete reloads the feed.
    pub async fn delete_item(&self, item_id: &ItemId, confirmation: Confirmation) -> Result<DeleteOutcome> {
        let viewer = self.viewer();
        let result = self
            .coordinator
            .delete_item(&self.feed.handle(), viewer.as_ref(), item_id, confirmation)
            .await;

        if let Err(err) = &result {
            if !err.is_precondition() && !matches!(err, AppError::NotFound(..)) {
                self.reload().await;
            }
        }
        result
    }

    /// Creates or updates an item. New items show up after a reload from the top.
    pub async fn save_item(&self, draft: ItemDraft, image: Option<ImageUpload>) -> Result<Item> {
        let viewer = self.viewer();
        let creating = draft.id.is_none();
        let item = self
            .coordinator
            .save_item(&self.feed.handle(), viewer.as_ref(), draft, image)
            .await?;

        if creating && self.is_entered() {
            self.reload().await;
        }
        Ok(item)
    }

    /// One item for the detail page: the loaded copy, or the stored one.
    pub async fn item(&self, item_id: &ItemId) -> Result<Item> {
        self.coordinator.load(&self.feed.handle(), item_id).await
    }

    pub fn share(&self, item: &Item) -> SharePayload {
        SharePayload::for_item(item, self.coordinator.settings())
    }

    async fn reload(&self) {
        if let Err(err) = self.feed.load_first_page(self.page_size()).await {
            warn!(error = %err, "feed reload failed");
        }
    }
}
