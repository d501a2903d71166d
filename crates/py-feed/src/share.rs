//! Share payloads for the item detail page.

use serde::Serialize;

use py_core::Item;

use crate::settings::FeedSettings;

/// What a share sheet (or the copy-link fallback) receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl SharePayload {
    pub fn for_item(item: &Item, settings: &FeedSettings) -> Self {
        Self {
            title: format!("{} - PerdidosYa!", item.name),
            text: item.description.clone(),
            url: settings.share_url(&item.id),
        }
    }
}
