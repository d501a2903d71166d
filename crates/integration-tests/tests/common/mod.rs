//! In-memory fakes for the catalog ports, with failure injection and request counters.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::watch;

use py_core::{
    Clock, Comment, CommentNotification, ContentModerator, ImageUpload, Item, ItemId, ItemStore,
    ItemType, Location, ModerationVerdict, Notifier, ObjectStorage, PageCursor, UserId, Viewer,
};
use py_feed::{CatalogPorts, CatalogSession, FeedSettings, MutationCoordinator};

/// 12 June 2024, 11:00 at the campus offset (-04:00).
pub fn campus_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 15, 0, 0).unwrap()
}

pub fn viewer(uid: &str, verified: bool) -> Viewer {
    Viewer {
        uid: UserId::new(uid),
        email: Some(format!("{uid}@uni.edu")),
        display_name: Some(uid.to_string()),
        photo_url: None,
        email_verified: verified,
    }
}

pub fn item(id: &str, name: &str, author: &str, created_at: DateTime<Utc>) -> Item {
    Item {
        id: ItemId::new(id),
        name: name.to_string(),
        description: String::new(),
        image_url: format!("/media/items/{id}/image"),
        location: Some(Location::Biblioteca),
        item_type: Some(ItemType::Lost),
        author_id: UserId::new(author),
        author_name: author.to_string(),
        author_email: Some(format!("{author}@uni.edu")),
        author_photo_url: None,
        is_anonymous: false,
        created_at,
        posted_at: created_at,
        updated_at: created_at,
        likes: Vec::new(),
        comments: Vec::new(),
    }
}

/// `count` items, newest first, one minute apart.
pub fn items(count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| item(&format!("item-{i:03}"), &format!("Objeto {i}"), "owner", campus_now() - Duration::minutes(i as i64)))
        .collect()
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStore {
    items: Mutex<Vec<Item>>,
    pub page_requests: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    /// Yield once inside each call so concurrent callers interleave.
    pub yield_inside: AtomicBool,
}

impl FakeStore {
    pub fn with_items(items: Vec<Item>) -> Self {
        let store = Self::default();
        *store.items.lock().unwrap() = items;
        store
    }

    pub fn get(&self, id: &ItemId) -> Option<Item> {
        self.items.lock().unwrap().iter().find(|i| &i.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    async fn enter(&self, write: bool) -> anyhow::Result<()> {
        if self.yield_inside.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let (counter, fail) = if write {
            (&self.writes, &self.fail_writes)
        } else {
            (&self.reads, &self.fail_reads)
        };
        counter.fetch_add(1, Ordering::SeqCst);
        if fail.load(Ordering::SeqCst) {
            anyhow::bail!("injected {} failure", if write { "write" } else { "read" });
        }
        Ok(())
    }

    fn with_item<T>(&self, id: &ItemId, f: impl FnOnce(&mut Item) -> T) -> anyhow::Result<T> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| anyhow::anyhow!("no item {id}"))?;
        Ok(f(item))
    }
}

fn before(item: &Item, cursor: &PageCursor) -> bool {
    (item.created_at, &item.id) < (cursor.created_at(), cursor.item_id())
}

#[async_trait]
impl ItemStore for FakeStore {
    async fn query_items_page(&self, page_size: usize, after: Option<PageCursor>) -> anyhow::Result<Vec<Item>> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        self.enter(false).await?;
        let mut items = self.items.lock().unwrap().clone();
        items.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        Ok(items
            .into_iter()
            .filter(|item| after.as_ref().map_or(true, |cursor| before(item, cursor)))
            .take(page_size)
            .collect())
    }

    async fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<Item>> {
        self.enter(false).await?;
        Ok(self.get(id))
    }

    async fn upsert_item(&self, item: &Item) -> anyhow::Result<()> {
        self.enter(true).await?;
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn delete_item(&self, id: &ItemId) -> anyhow::Result<()> {
        self.enter(true).await?;
        self.items.lock().unwrap().retain(|i| &i.id != id);
        Ok(())
    }

    async fn append_comment(&self, item_id: &ItemId, comment: &Comment) -> anyhow::Result<()> {
        self.enter(true).await?;
        self.with_item(item_id, |item| item.comments.push(comment.clone()))
    }

    async fn remove_comment(&self, item_id: &ItemId, comment: &Comment) -> anyhow::Result<()> {
        self.enter(true).await?;
        self.with_item(item_id, |item| item.comments.retain(|c| c.id != comment.id))
    }

    async fn toggle_like(&self, item_id: &ItemId, user_id: &UserId) -> anyhow::Result<bool> {
        self.enter(true).await?;
        self.with_item(item_id, |item| item.toggle_like(user_id))
    }

    async fn count_items_by_author_in_range(
        &self,
        author_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        self.enter(false).await?;
        let items = self.items.lock().unwrap();
        Ok(items
            .iter()
            .filter(|i| &i.author_id == author_id && i.posted_at >= start && i.posted_at <= end)
            .count() as u64)
    }
}

// ── Other ports ─────────────────────────────────────────────────────────────

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
pub struct RecordingStorage {
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn upload_file(&self, path: &str, _bytes: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.uploads.lock().unwrap().push(path.to_string());
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("/media/{path}")
    }

    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        self.deletes.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// Approves everything except texts containing `blocked`.
#[derive(Default)]
pub struct StubModerator {
    pub blocked: Option<String>,
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

#[async_trait]
impl ContentModerator for StubModerator {
    async fn validate_text(&self, text: &str) -> anyhow::Result<ModerationVerdict> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.blocked {
            Some(word) if text.to_lowercase().contains(word.as_str()) => {
                ModerationVerdict::rejected("El texto contiene contenido inapropiado")
            }
            _ => ModerationVerdict::approved(),
        })
    }

    async fn validate_image(&self, _image: &ImageUpload) -> anyhow::Result<ModerationVerdict> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModerationVerdict::approved())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<CommentNotification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_comment_notification(&self, notification: &CommentNotification) -> anyhow::Result<bool> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(true)
    }
}

// ── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub storage: Arc<RecordingStorage>,
    pub moderator: Arc<StubModerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: Arc<MutationCoordinator>,
}

impl Harness {
    pub fn new(store: FakeStore) -> Self {
        Self::with_moderator(store, StubModerator::default())
    }

    pub fn with_moderator(store: FakeStore, moderator: StubModerator) -> Self {
        let store = Arc::new(store);
        let storage = Arc::new(RecordingStorage::default());
        let moderator = Arc::new(moderator);
        let notifier = Arc::new(RecordingNotifier::default());
        let ports = CatalogPorts {
            store: store.clone(),
            storage: storage.clone(),
            moderator: moderator.clone(),
            notifier: notifier.clone(),
            clock: Arc::new(FixedClock(campus_now())),
        };
        let coordinator = Arc::new(MutationCoordinator::new(ports, FeedSettings::default()));
        Self { store, storage, moderator, notifier, coordinator }
    }

    pub fn session(&self, viewer: Option<Viewer>) -> CatalogSession {
        CatalogSession::new(Arc::clone(&self.coordinator), watch::channel(viewer).1)
    }
}

pub fn png(name: &str) -> ImageUpload {
    ImageUpload::new(name, vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a])
}
