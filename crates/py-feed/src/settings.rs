use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use py_core::ItemId;

/// Tunables shared by the feed controller, the mutation coordinator and the loaders.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: usize,
    /// Deadline applied to every remote call.
    pub remote_timeout: Duration,
    /// Offset in which calendar days (quota, date buckets) are evaluated.
    pub utc_offset: FixedOffset,
    /// Absolute base URL used in e-mails and share links, without trailing slash.
    pub public_base_url: String,
    pub max_image_bytes: usize,
    pub daily_post_limit: u64,
    pub comment_limit: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: 12,
            remote_timeout: Duration::from_secs(15),
            utc_offset: FixedOffset::west_opt(4 * 3600).unwrap_or_else(|| Utc.fix()),
            public_base_url: "http://localhost:8080".to_string(),
            max_image_bytes: 5 * 1024 * 1024,
            daily_post_limit: 3,
            comment_limit: 3,
        }
    }
}

impl FeedSettings {
    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.utc_offset)
    }

    /// Link to the item used in comment notifications.
    pub fn item_url(&self, id: &ItemId) -> String {
        format!("{}/items/{}", self.base(), id)
    }

    /// Link to the item detail page used when sharing.
    pub fn share_url(&self, id: &ItemId) -> String {
        format!("{}/items?id={}", self.base(), id)
    }

    fn base(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }
}
