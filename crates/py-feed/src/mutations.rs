//! # Mutation Coordinator
//!
//! Applies user intent to the loaded feed immediately, then issues the
//! authoritative remote write. Preconditions (identity, verification, quotas,
//! moderation, validation) are checked before anything changes. A failed write
//! drops its optimistic delta and re-fetches the item.
//!
//! One coordinator serves every session; each call names the feed it acts on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, warn};

use py_core::calendar::day_bounds;
use py_core::{
    AppError, Clock, Comment, CommentId, ContentModerator, ImageUpload, Item, ItemDraft, ItemId,
    ItemStore, ItemType, ModerationVerdict, Notifier, ObjectStorage, Quota, Result, UserId, Viewer,
};

use crate::entry::PendingDelta;
use crate::feed::FeedHandle;
use crate::notify;
use crate::remote::{bounded, RemoteOp};
use crate::settings::FeedSettings;

const MODERATION_UNAVAILABLE: &str = "Error al validar el contenido. Por favor, intente nuevamente.";
const TEXT_REJECTED: &str = "El contenido contiene material inapropiado.";
const IMAGE_REJECTED: &str =
    "La imagen contiene contenido inapropiado: La imagen infringe los términos de uso de la plataforma.";
const ALLOWED_IMAGE_TYPES: [&str; 2] = ["image/png", "image/jpeg"];

/// The external collaborators the coordinator writes through.
#[derive(Clone)]
pub struct CatalogPorts {
    pub store: Arc<dyn ItemStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub moderator: Arc<dyn ContentModerator>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// Explicit answer to the "delete this item?" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

type LikeKey = (ItemId, UserId);

/// Marks a like toggle as in flight for its (item, user) pair until dropped.
struct LikeGuard<'a> {
    in_flight: &'a Mutex<HashSet<LikeKey>>,
    key: LikeKey,
}

impl Drop for LikeGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct MutationCoordinator {
    ports: CatalogPorts,
    settings: FeedSettings,
    likes_in_flight: Mutex<HashSet<LikeKey>>,
}

fn require_viewer(viewer: Option<&Viewer>) -> Result<&Viewer> {
    viewer.ok_or(AppError::Unauthenticated)
}

fn require_verified(viewer: Option<&Viewer>) -> Result<&Viewer> {
    let viewer = require_viewer(viewer)?;
    if viewer.email_verified {
        Ok(viewer)
    } else {
        Err(AppError::EmailNotVerified)
    }
}

impl MutationCoordinator {
    pub fn new(ports: CatalogPorts, settings: FeedSettings) -> Self {
        Self {
            ports,
            settings,
            likes_in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn ports(&self) -> &CatalogPorts {
        &self.ports
    }

    // ── Likes ───────────────────────────────────────────────────────────────

    /// Flips the viewer's like on `item_id`. Returns whether the viewer likes
    /// the item afterwards, as reported by the store.
    pub async fn toggle_like(
        &self,
        feed: &FeedHandle,
        viewer: Option<&Viewer>,
        item_id: &ItemId,
    ) -> Result<bool> {
        let viewer = require_verified(viewer)?;
        let _guard = self.claim_like(item_id, &viewer.uid)?;

        let delta = feed.visible(item_id).and_then(|item| {
            let liked = !item.is_liked_by(&viewer.uid);
            feed.push(item_id, PendingDelta::LikeToggled { user: viewer.uid.clone(), liked })
        });

        let result = bounded(
            self.settings.remote_timeout,
            RemoteOp::Write,
            "toggle like",
            self.ports.store.toggle_like(item_id, &viewer.uid),
        )
        .await;

        match result {
            Ok(liked) => {
                if let Some(delta) = delta {
                    feed.confirm_like(item_id, delta, liked);
                }
                info!(item_id = %item_id, user_id = %viewer.uid, liked, "like toggled");
                Ok(liked)
            }
            Err(err) => {
                error!(item_id = %item_id, user_id = %viewer.uid, error = %err, "like toggle failed");
                if let Some(delta) = delta {
                    feed.discard(item_id, delta);
                }
                self.refetch(feed, item_id).await;
                Err(err)
            }
        }
    }

    fn claim_like(&self, item_id: &ItemId, user_id: &UserId) -> Result<LikeGuard<'_>> {
        let key = (item_id.clone(), user_id.clone());
        let mut in_flight = self.likes_in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return Err(AppError::Conflict(format!("like on {item_id} already pending")));
        }
        Ok(LikeGuard { in_flight: &self.likes_in_flight, key })
    }

    // ── Comments ────────────────────────────────────────────────────────────

    pub async fn add_comment(
        &self,
        feed: &FeedHandle,
        viewer: Option<&Viewer>,
        item_id: &ItemId,
        text: &str,
        anonymous: bool,
    ) -> Result<Comment> {
        let viewer = require_verified(viewer)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::ValidationFailed("El comentario no puede estar vacío".into()));
        }

        let current = self.fetch(item_id).await?;
        if current.comments_by(&viewer.uid) >= self.settings.comment_limit {
            return Err(AppError::QuotaExceeded(Quota::CommentsPerItem));
        }
        self.moderate_text(text).await?;

        let comment = Comment::authored(viewer, text, anonymous, self.ports.clock.now());
        let delta = feed.push(item_id, PendingDelta::CommentAdded(comment.clone()));

        let result = bounded(
            self.settings.remote_timeout,
            RemoteOp::Write,
            "append comment",
            self.ports.store.append_comment(item_id, &comment),
        )
        .await;

        if let Err(err) = result {
            error!(item_id = %item_id, user_id = %viewer.uid, error = %err, "comment append failed");
            if let Some(delta) = delta {
                feed.discard(item_id, delta);
            }
            self.refetch(feed, item_id).await;
            return Err(err);
        }

        if let Some(delta) = delta {
            feed.confirm(item_id, delta);
        }
        info!(item_id = %item_id, comment_id = %comment.id, anonymous, "comment added");

        let mut commented = current;
        commented.comments.push(comment.clone());
        if let Some(plan) =
            notify::plan_comment_notification(&commented, &comment, self.settings.item_url(item_id))
        {
            notify::dispatch(self.ports.notifier.as_ref(), &plan, self.settings.remote_timeout).await;
        }

        Ok(comment)
    }

    /// Removes one of the viewer's own comments.
    pub async fn delete_comment(
        &self,
        feed: &FeedHandle,
        viewer: Option<&Viewer>,
        item_id: &ItemId,
        comment_id: &CommentId,
    ) -> Result<()> {
        let viewer = require_viewer(viewer)?;
        let item = self.load(feed, item_id).await?;
        let comment = item
            .comment(comment_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Comment", comment_id.to_string()))?;
        if comment.author_id != viewer.uid {
            return Err(AppError::Unauthorized("only the author can delete a comment".into()));
        }

        let delta = feed.push(item_id, PendingDelta::CommentRemoved(comment_id.clone()));
        let result = bounded(
            self.settings.remote_timeout,
            RemoteOp::Write,
            "remove comment",
            self.ports.store.remove_comment(item_id, &comment),
        )
        .await;

        match result {
            Ok(()) => {
                if let Some(delta) = delta {
                    feed.confirm(item_id, delta);
                }
                info!(item_id = %item_id, comment_id = %comment_id, "comment deleted");
                Ok(())
            }
            Err(err) => {
                error!(item_id = %item_id, comment_id = %comment_id, error = %err, "comment removal failed");
                if let Some(delta) = delta {
                    feed.discard(item_id, delta);
                }
                self.refetch(feed, item_id).await;
                Err(err)
            }
        }
    }

    // ── Items ───────────────────────────────────────────────────────────────

    /// Deletes the viewer's own item and its stored image.
    ///
    /// On failure the item is put back; callers reload the feed to resync.
    pub async fn delete_item(
        &self,
        feed: &FeedHandle,
        viewer: Option<&Viewer>,
        item_id: &ItemId,
        confirmation: Confirmation,
    ) -> Result<DeleteOutcome> {
        let viewer = require_viewer(viewer)?;
        let item = self.load(feed, item_id).await?;
        if !item.is_authored_by(&viewer.uid) {
            return Err(AppError::Unauthorized("only the author can delete an item".into()));
        }
        if confirmation == Confirmation::Declined {
            return Ok(DeleteOutcome::Cancelled);
        }

        let removed = feed.remove(item_id);
        let result = bounded(
            self.settings.remote_timeout,
            RemoteOp::Write,
            "delete item",
            self.ports.store.delete_item(item_id),
        )
        .await;

        if let Err(err) = result {
            error!(item_id = %item_id, error = %err, "item deletion failed");
            if let Some(removed) = removed {
                feed.restore(removed);
            }
            return Err(err);
        }

        if !item.image_url.is_empty() {
            let image = bounded(
                self.settings.remote_timeout,
                RemoteOp::Write,
                "delete image",
                self.ports.storage.delete_file(&item_id.image_path()),
            )
            .await;
            if let Err(err) = image {
                warn!(item_id = %item_id, error = %err, "item deleted but its image could not be removed");
            }
        }

        info!(item_id = %item_id, user_id = %viewer.uid, "item deleted");
        Ok(DeleteOutcome::Deleted)
    }

    /// Creates (`draft.id == None`) or updates an item.
    ///
    /// Order: identity, validation, ownership or daily quota, moderation,
    /// image upload, document upsert. Nothing is written if an earlier step fails.
    pub async fn save_item(
        &self,
        feed: &FeedHandle,
        viewer: Option<&Viewer>,
        draft: ItemDraft,
        image: Option<ImageUpload>,
    ) -> Result<Item> {
        let viewer = require_verified(viewer)?;
        let now = self.ports.clock.now();
        self.validate_draft(&draft, image.as_ref(), now)?;

        let existing = match &draft.id {
            Some(id) => {
                let existing = self.fetch(id).await?;
                if !existing.is_authored_by(&viewer.uid) {
                    return Err(AppError::Unauthorized("only the author can edit an item".into()));
                }
                Some(existing)
            }
            None => {
                self.check_daily_quota(&viewer.uid).await?;
                None
            }
        };

        self.moderate_text(&draft.name).await?;
        if !draft.description.trim().is_empty() {
            self.moderate_text(&draft.description).await?;
        }
        if let Some(image) = &image {
            self.moderate_image(image).await?;
        }

        let id = draft.id.clone().unwrap_or_else(ItemId::generate);
        let image_url = match &image {
            Some(image) => self.upload_image(&id, image).await?,
            None => draft
                .image_url
                .clone()
                .filter(|url| !url.is_empty())
                .or_else(|| existing.as_ref().map(|e| e.image_url.clone()))
                .unwrap_or_default(),
        };

        let item = match existing {
            Some(mut item) => {
                item.name = draft.name.trim().to_string();
                item.description = draft.description.trim().to_string();
                item.location = draft.location;
                item.item_type = Some(draft.item_type);
                item.is_anonymous = draft.is_anonymous;
                item.image_url = image_url;
                item.updated_at = now.max(item.created_at);
                item
            }
            None => Item {
                id: id.clone(),
                name: draft.name.trim().to_string(),
                description: draft.description.trim().to_string(),
                image_url,
                location: draft.location,
                item_type: Some(draft.item_type),
                author_id: viewer.uid.clone(),
                author_name: viewer.display_name_or_fallback().to_string(),
                author_email: viewer.email.clone(),
                author_photo_url: viewer.photo_url.clone(),
                is_anonymous: draft.is_anonymous,
                created_at: draft.reported_at.unwrap_or(now),
                posted_at: now,
                updated_at: now,
                likes: Vec::new(),
                comments: Vec::new(),
            },
        };

        bounded(
            self.settings.remote_timeout,
            RemoteOp::Write,
            "upsert item",
            self.ports.store.upsert_item(&item),
        )
        .await
        .inspect_err(|err| error!(item_id = %id, error = %err, "item write failed"))?;

        if draft.id.is_some() {
            feed.replace(item.clone());
            info!(item_id = %id, "item updated");
        } else {
            info!(item_id = %id, user_id = %viewer.uid, item_type = item_type_str(&item), "item created");
        }
        Ok(item)
    }

    fn validate_draft(
        &self,
        draft: &ItemDraft,
        image: Option<&ImageUpload>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let invalid = |msg: &str| Err(AppError::ValidationFailed(msg.to_string()));

        if draft.name.trim().is_empty() {
            return invalid("El nombre es obligatorio");
        }
        let Some(location) = draft.location else {
            return invalid("Selecciona una ubicación");
        };
        if let Some(hint) = location.detail_hint() {
            if draft.description.trim().is_empty() {
                return invalid(hint);
            }
        }
        if draft.reported_at.is_some_and(|at| at > now) {
            return invalid("La fecha no puede ser futura");
        }

        match image {
            Some(image) => {
                if image.is_empty() {
                    return invalid("La imagen está vacía");
                }
                if image.len() > self.settings.max_image_bytes {
                    return invalid("La imagen no puede superar los 5MB");
                }
                let allowed = image
                    .content_type()
                    .is_some_and(|mime| ALLOWED_IMAGE_TYPES.contains(&mime.essence_str()));
                if !allowed {
                    return invalid("Solo se permiten imágenes PNG o JPEG");
                }
            }
            None => {
                let keeps_image = draft.id.is_some()
                    || draft.image_url.as_deref().is_some_and(|url| !url.is_empty());
                if !keeps_image {
                    return invalid("La imagen es obligatoria");
                }
            }
        }
        Ok(())
    }

    /// Fails closed: if today's count cannot be read, nothing is created.
    async fn check_daily_quota(&self, author: &UserId) -> Result<()> {
        let (start, end) = day_bounds(self.settings.local(self.ports.clock.now()));
        let count = bounded(
            self.settings.remote_timeout,
            RemoteOp::Read,
            "count items by author",
            self.ports.store.count_items_by_author_in_range(author, start, end),
        )
        .await?;

        if count >= self.settings.daily_post_limit {
            info!(user_id = %author, count, "daily post limit reached");
            return Err(AppError::QuotaExceeded(Quota::DailyPosts));
        }
        Ok(())
    }

    async fn upload_image(&self, id: &ItemId, image: &ImageUpload) -> Result<String> {
        let path = id.image_path();
        let content_type = image
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        bounded(
            self.settings.remote_timeout,
            RemoteOp::Write,
            "upload image",
            self.ports.storage.upload_file(&path, image.bytes.clone(), &content_type),
        )
        .await?;
        Ok(self.ports.storage.public_url(&path))
    }

    // ── Moderation ──────────────────────────────────────────────────────────

    async fn moderate_text(&self, text: &str) -> Result<()> {
        let verdict = tokio::time::timeout(
            self.settings.remote_timeout,
            self.ports.moderator.validate_text(text),
        )
        .await;
        judge(verdict, TEXT_REJECTED)
    }

    async fn moderate_image(&self, image: &ImageUpload) -> Result<()> {
        let verdict = tokio::time::timeout(
            self.settings.remote_timeout,
            self.ports.moderator.validate_image(image),
        )
        .await;
        judge(verdict, IMAGE_REJECTED)
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    async fn fetch(&self, id: &ItemId) -> Result<Item> {
        bounded(
            self.settings.remote_timeout,
            RemoteOp::Read,
            "get item",
            self.ports.store.get_item(id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Item", id.to_string()))
    }

    /// The loaded copy if present, else the stored one.
    pub async fn load(&self, feed: &FeedHandle, id: &ItemId) -> Result<Item> {
        match feed.visible(id) {
            Some(item) => Ok(item),
            None => self.fetch(id).await,
        }
    }

    /// Restores ground truth for one item after a failed write.
    async fn refetch(&self, feed: &FeedHandle, id: &ItemId) {
        match self.fetch(id).await {
            Ok(item) => feed.refresh(item),
            Err(AppError::NotFound(..)) => {
                feed.remove(id);
            }
            Err(err) => warn!(item_id = %id, error = %err, "could not re-fetch item after failed write"),
        }
    }
}

fn judge(
    verdict: std::result::Result<anyhow::Result<ModerationVerdict>, tokio::time::error::Elapsed>,
    rejected: &str,
) -> Result<()> {
    match verdict {
        Ok(Ok(verdict)) if verdict.is_valid => Ok(()),
        Ok(Ok(verdict)) => Err(AppError::ModerationRejected(
            verdict.message.unwrap_or_else(|| rejected.to_string()),
        )),
        Ok(Err(err)) => {
            warn!(error = %err, "moderation service failed");
            Err(AppError::ModerationRejected(MODERATION_UNAVAILABLE.to_string()))
        }
        Err(_) => {
            warn!("moderation service timed out");
            Err(AppError::ModerationRejected(MODERATION_UNAVAILABLE.to_string()))
        }
    }
}

fn item_type_str(item: &Item) -> &'static str {
    item.item_type.map(ItemType::as_str).unwrap_or("unknown")
}
