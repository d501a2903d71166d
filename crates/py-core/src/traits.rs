//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be wired into the binary.
//! Adapter failures are opaque (`anyhow`); the feed services translate them
//! into the `AppError` taxonomy.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::AuthError;
use crate::models::{
    AuthSession, Comment, CommentNotification, ImageUpload, Item, ItemId, ModerationVerdict,
    PageCursor, UserId, Viewer,
};

/// Document persistence contract for items and their embedded comments and likes.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Up to `page_size` items ordered by `createdAt` descending, strictly after `after`.
    async fn query_items_page(
        &self,
        page_size: usize,
        after: Option<PageCursor>,
    ) -> anyhow::Result<Vec<Item>>;

    async fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<Item>>;

    /// Insert or merge-update keyed by `item.id`.
    async fn upsert_item(&self, item: &Item) -> anyhow::Result<()>;

    async fn delete_item(&self, id: &ItemId) -> anyhow::Result<()>;

    async fn append_comment(&self, item_id: &ItemId, comment: &Comment) -> anyhow::Result<()>;

    async fn remove_comment(&self, item_id: &ItemId, comment: &Comment) -> anyhow::Result<()>;

    /// Adds `user_id` to `likes` if absent, removes it if present.
    /// Returns whether the user likes the item afterwards.
    async fn toggle_like(&self, item_id: &ItemId, user_id: &UserId) -> anyhow::Result<bool>;

    /// Items by `author_id` whose `createdAt` lies in `[start, end]`.
    async fn count_items_by_author_in_range(
        &self,
        author_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}

/// Object storage contract for item images.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload_file(&self, path: &str, bytes: Bytes, content_type: &str) -> anyhow::Result<()>;

    /// Publicly reachable URL of the object at `path`.
    fn public_url(&self, path: &str) -> String;

    async fn delete_file(&self, path: &str) -> anyhow::Result<()>;
}

/// Text and image moderation contract.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ContentModerator: Send + Sync {
    async fn validate_text(&self, text: &str) -> anyhow::Result<ModerationVerdict>;

    async fn validate_image(&self, image: &ImageUpload) -> anyhow::Result<ModerationVerdict>;
}

/// E-mail delivery contract. Best-effort: callers log and swallow failures.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the message was accepted for delivery.
    async fn send_comment_notification(
        &self,
        notification: &CommentNotification,
    ) -> anyhow::Result<bool>;
}

/// Identity contract.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_in_with_federated_popup(
        &self,
        provider_id: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self, token: &str);

    /// Observable identity of the session behind `token`.
    /// Unknown tokens yield a channel that holds `None`.
    fn current_user(&self, token: &str) -> watch::Receiver<Option<Viewer>>;

    async fn send_verification_email(&self, user_id: &UserId) -> bool;

    /// Consumes a verification token. Returns whether an account was verified.
    async fn confirm_email(&self, token: &str) -> bool;

    /// Re-reads the account and reports whether its e-mail is verified.
    async fn reload_and_check_verified(&self, user_id: &UserId) -> bool;
}

/// Source of "now", injected so calendar rules are testable.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
