//! # Scroll-Triggered Loader
//!
//! One passive observer per catalog tab. When the trailing sentinel of the
//! active tab becomes visible, its loader asks the feed for the next page.
//! Observers of inactive tabs ignore visibility events, and a detached
//! observer ignores everything. Requests already in flight are never cancelled.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use py_core::{Result, Tab};

use crate::feed::{FeedController, PageLoad};

/// What the trailing sentinel of a tab shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Loading,
    MoreAvailable,
    Exhausted,
}

impl Sentinel {
    pub fn text(self) -> &'static str {
        match self {
            Sentinel::Loading => "Cargando más objetos...",
            Sentinel::MoreAvailable => "Scroll para cargar más objetos",
            Sentinel::Exhausted => {
                "¡Eso es todo por ahora! Pero no pierdas la esperanza, sigue buscando o reporta tu objeto perdido."
            }
        }
    }

    pub fn is_exhausted(self) -> bool {
        self == Sentinel::Exhausted
    }
}

#[derive(Debug)]
pub struct ScrollLoader {
    tab: Tab,
    attached: AtomicBool,
}

impl ScrollLoader {
    pub fn new(tab: Tab) -> Self {
        Self {
            tab,
            attached: AtomicBool::new(true),
        }
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Tears observation down when the owning view goes away.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn attach(&self) {
        self.attached.store(true, Ordering::Release);
    }

    /// The sentinel to render after `visible_count` filtered items, or `None`
    /// when the tab's filtered list is empty.
    pub fn sentinel(&self, visible_count: usize, feed: &FeedController) -> Option<Sentinel> {
        if visible_count == 0 {
            return None;
        }
        Some(if feed.is_loading() {
            Sentinel::Loading
        } else if feed.has_more() {
            Sentinel::MoreAvailable
        } else {
            Sentinel::Exhausted
        })
    }

    /// Sentinel became visible while `active_tab` is displayed.
    pub async fn on_sentinel_visible(
        &self,
        active_tab: Tab,
        feed: &FeedController,
        page_size: usize,
    ) -> Result<PageLoad> {
        if !self.is_attached() || active_tab != self.tab {
            debug!(tab = self.tab.as_str(), active = active_tab.as_str(), "ignoring sentinel event");
            return Ok(PageLoad::Skipped);
        }
        feed.load_next_page(page_size).await
    }
}

/// The three per-tab observers of a catalog view.
#[derive(Debug)]
pub struct TabLoaders {
    all: ScrollLoader,
    lost: ScrollLoader,
    found: ScrollLoader,
}

impl TabLoaders {
    pub fn new() -> Self {
        Self {
            all: ScrollLoader::new(Tab::All),
            lost: ScrollLoader::new(Tab::Lost),
            found: ScrollLoader::new(Tab::Found),
        }
    }

    pub fn get(&self, tab: Tab) -> &ScrollLoader {
        match tab {
            Tab::All => &self.all,
            Tab::Lost => &self.lost,
            Tab::Found => &self.found,
        }
    }

    pub fn detach_all(&self) {
        for tab in Tab::ALL {
            self.get(tab).detach();
        }
    }

    pub fn attach_all(&self) {
        for tab in Tab::ALL {
            self.get(tab).attach();
        }
    }
}

impl Default for TabLoaders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use py_core::MockItemStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn idle_feed() -> FeedController {
        let mut store = MockItemStore::new();
        store.expect_query_items_page().times(0);
        FeedController::new(Arc::new(store), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn inactive_or_detached_loaders_do_not_fetch() {
        let feed = idle_feed();
        let loaders = TabLoaders::new();

        let lost = loaders.get(Tab::Lost).on_sentinel_visible(Tab::All, &feed, 12).await;
        assert_eq!(lost.unwrap(), PageLoad::Skipped);

        loaders.detach_all();
        let all = loaders.get(Tab::All).on_sentinel_visible(Tab::All, &feed, 12).await;
        assert_eq!(all.unwrap(), PageLoad::Skipped);
    }

    #[test]
    fn empty_tabs_render_no_sentinel() {
        let feed = idle_feed();
        let loader = ScrollLoader::new(Tab::Found);
        assert_eq!(loader.sentinel(0, &feed), None);
        assert_eq!(loader.sentinel(3, &feed), Some(Sentinel::MoreAvailable));
    }
}
