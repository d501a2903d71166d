mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;
use tokio_test::{assert_err, assert_ok};

use common::{campus_now, item, png, viewer, FakeStore, FixedClock, Harness, StubModerator};
use py_core::{
    AppError, Comment, ItemDraft, ItemId, ItemType, Location, MockContentModerator, MockItemStore,
    MockNotifier, MockObjectStorage, Quota,
};
use py_feed::{CatalogPorts, Confirmation, DeleteOutcome, FeedSettings, MutationCoordinator};

fn draft(name: &str) -> ItemDraft {
    ItemDraft {
        id: None,
        name: name.to_string(),
        description: String::new(),
        location: Some(Location::Biblioteca),
        item_type: ItemType::Lost,
        is_anonymous: false,
        reported_at: None,
        image_url: None,
    }
}

fn seeded() -> FakeStore {
    FakeStore::with_items(vec![item("termo", "Termo verde", "owner", campus_now() - Duration::hours(2))])
}

// ── Likes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_liking_twice_restores_membership_and_count() {
    let harness = Harness::new(seeded());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    let id = ItemId::new("termo");

    assert!(assert_ok!(session.toggle_like(&id).await));
    assert_eq!(session.feed().item(&id).unwrap().like_count(), 1);

    assert!(!assert_ok!(session.toggle_like(&id).await));
    let visible = session.feed().item(&id).unwrap();
    assert_eq!(visible.like_count(), 0);
    assert!(harness.store.get(&id).unwrap().likes.is_empty());
}

#[tokio::test]
async fn test_overlapping_toggle_is_rejected_without_a_second_write() {
    let harness = Harness::new(seeded());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    let id = ItemId::new("termo");
    harness.store.yield_inside.store(true, Ordering::SeqCst);

    let (first, second) = tokio::join!(session.toggle_like(&id), session.toggle_like(&id));

    assert!(assert_ok!(first));
    assert!(matches!(assert_err!(second), AppError::Conflict(_)));
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), 1);
    assert_eq!(session.feed().item(&id).unwrap().like_count(), 1);
}

#[tokio::test]
async fn test_unverified_viewer_cannot_like() {
    let harness = Harness::new(seeded());
    let session = harness.session(Some(viewer("ana", false)));
    assert_ok!(session.enter().await);

    let err = assert_err!(session.toggle_like(&ItemId::new("termo")).await);
    assert!(matches!(err, AppError::EmailNotVerified));
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_like_drops_the_optimistic_flip() {
    let harness = Harness::new(seeded());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    harness.store.fail_writes.store(true, Ordering::SeqCst);
    let id = ItemId::new("termo");

    let err = assert_err!(session.toggle_like(&id).await);
    assert!(matches!(err, AppError::RemoteWriteFailed(_)));
    assert_eq!(session.feed().item(&id).unwrap().like_count(), 0);
}

// ── Comments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fourth_comment_is_rejected_without_any_change() {
    let harness = Harness::new(seeded());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    let id = ItemId::new("termo");

    for n in 1..=3 {
        assert_ok!(session.add_comment(&id, &format!("Lo vi ({n})"), false).await);
    }
    let writes = harness.store.writes.load(Ordering::SeqCst);

    let err = assert_err!(session.add_comment(&id, "¿Sigue perdido?", false).await);
    assert!(matches!(err, AppError::QuotaExceeded(Quota::CommentsPerItem)));
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), writes);
    assert_eq!(harness.store.get(&id).unwrap().comments.len(), 3);
    assert_eq!(session.feed().item(&id).unwrap().comments.len(), 3);
    assert_eq!(harness.moderator.text_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rejected_comment_text_is_never_written() {
    let moderator = StubModerator { blocked: Some("idiota".into()), ..Default::default() };
    let harness = Harness::with_moderator(seeded(), moderator);
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    let err = assert_err!(session.add_comment(&ItemId::new("termo"), "qué idiota", false).await);
    assert!(matches!(err, AppError::ModerationRejected(_)));
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_comment_append_disappears_after_refetch() {
    let harness = Harness::new(seeded());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    harness.store.fail_writes.store(true, Ordering::SeqCst);
    let id = ItemId::new("termo");

    let err = assert_err!(session.add_comment(&id, "Lo dejé en conserjería", false).await);
    assert!(matches!(err, AppError::RemoteWriteFailed(_)));
    assert!(session.feed().item(&id).unwrap().comments.is_empty());
    assert!(harness.store.get(&id).unwrap().comments.is_empty());
}

#[tokio::test]
async fn test_failed_comment_delete_brings_the_comment_back() {
    let mut termo = item("termo", "Termo verde", "owner", campus_now() - Duration::hours(2));
    let comment = Comment::authored(&viewer("ana", true), "Es mío", false, campus_now());
    termo.comments.push(comment.clone());
    let harness = Harness::new(FakeStore::with_items(vec![termo]));
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    harness.store.fail_writes.store(true, Ordering::SeqCst);
    let id = ItemId::new("termo");

    let err = assert_err!(session.delete_comment(&id, &comment.id).await);
    assert!(matches!(err, AppError::RemoteWriteFailed(_)));
    let visible = session.feed().item(&id).unwrap();
    assert_eq!(visible.comments, vec![comment]);
}

#[tokio::test]
async fn test_only_the_author_deletes_a_comment() {
    let mut termo = item("termo", "Termo verde", "owner", campus_now() - Duration::hours(2));
    let comment = Comment::authored(&viewer("ana", true), "Es mío", false, campus_now());
    termo.comments.push(comment.clone());
    let harness = Harness::new(FakeStore::with_items(vec![termo]));
    let session = harness.session(Some(viewer("luis", true)));
    assert_ok!(session.enter().await);

    let err = assert_err!(session.delete_comment(&ItemId::new("termo"), &comment.id).await);
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn test_comment_notifies_author_and_earlier_commenters() {
    let mut termo = item("termo", "Termo verde", "owner", campus_now() - Duration::hours(2));
    termo.comments.push(Comment::authored(&viewer("luis", true), "Yo también lo vi", false, campus_now()));
    let harness = Harness::new(FakeStore::with_items(vec![termo]));
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    assert_ok!(session.add_comment(&ItemId::new("termo"), "Está en conserjería", false).await);

    let sent = harness.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_email, "owner@uni.edu");
    assert_eq!(sent[0].bcc_emails, vec!["luis@uni.edu".to_string()]);
    assert_eq!(sent[0].item_url, "http://localhost:8080/items/termo");
    assert_eq!(sent[0].subject(), "Nuevo comentario en \"Termo verde\" - PerdidosYa!");
}

// ── Items ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fourth_post_of_the_day_is_rejected_before_upload() {
    let harness = Harness::new(FakeStore::default());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    for n in 1..=3 {
        assert_ok!(session.save_item(draft(&format!("Objeto {n}")), Some(png("foto.png"))).await);
    }
    let err = assert_err!(session.save_item(draft("Objeto 4"), Some(png("foto.png"))).await);

    assert!(matches!(err, AppError::QuotaExceeded(Quota::DailyPosts)));
    assert_eq!(harness.storage.uploads.lock().unwrap().len(), 3);
    assert_eq!(harness.store.len(), 3);
    assert_eq!(harness.moderator.image_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_backdated_posts_still_count_toward_the_daily_limit() {
    let harness = Harness::new(FakeStore::default());
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    let backdated = |name: &str| ItemDraft { reported_at: Some(campus_now() - Duration::days(2)), ..draft(name) };
    for n in 1..=3 {
        let saved = assert_ok!(session.save_item(backdated(&format!("Objeto {n}")), Some(png("foto.png"))).await);
        assert_eq!(saved.created_at, campus_now() - Duration::days(2));
        assert_eq!(saved.posted_at, campus_now());
    }
    let err = assert_err!(session.save_item(backdated("Objeto 4"), Some(png("foto.png"))).await);

    assert!(matches!(err, AppError::QuotaExceeded(Quota::DailyPosts)));
    assert_eq!(harness.store.len(), 3);
}

#[tokio::test]
async fn test_quota_reached_never_touches_storage_or_documents() {
    let mut store = MockItemStore::new();
    store.expect_count_items_by_author_in_range().returning(|_, _, _| Ok(3));
    store.expect_upsert_item().times(0);
    let mut storage = MockObjectStorage::new();
    storage.expect_upload_file().times(0);
    let mut moderator = MockContentModerator::new();
    moderator.expect_validate_text().times(0);
    moderator.expect_validate_image().times(0);

    let coordinator = MutationCoordinator::new(
        CatalogPorts {
            store: Arc::new(store),
            storage: Arc::new(storage),
            moderator: Arc::new(moderator),
            notifier: Arc::new(MockNotifier::new()),
            clock: Arc::new(FixedClock(campus_now())),
        },
        FeedSettings::default(),
    );
    let feed = py_feed::FeedController::new(Arc::clone(&coordinator.ports().store), coordinator.settings().remote_timeout);

    let ana = viewer("ana", true);
    let err = assert_err!(
        coordinator
            .save_item(&feed.handle(), Some(&ana), draft("Paraguas"), Some(png("paraguas.jpg")))
            .await
    );
    assert!(matches!(err, AppError::QuotaExceeded(Quota::DailyPosts)));
}

#[tokio::test]
async fn test_validation_runs_before_any_remote_call() {
    let harness = Harness::new(FakeStore::default());
    let session = harness.session(Some(viewer("ana", true)));

    let mut vague = draft("Chaqueta");
    vague.location = Some(Location::EdificioAula);
    let err = assert_err!(session.save_item(vague, Some(png("foto.png"))).await);
    assert!(matches!(err, AppError::ValidationFailed(_)));

    let err = assert_err!(session.save_item(draft("Chaqueta"), Some(png("foto.gif"))).await);
    assert!(matches!(err, AppError::ValidationFailed(_)));

    let mut future = draft("Chaqueta");
    future.reported_at = Some(campus_now() + Duration::days(1));
    let err = assert_err!(session.save_item(future, Some(png("foto.png"))).await);
    assert!(matches!(err, AppError::ValidationFailed(_)));

    assert_eq!(harness.store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(harness.moderator.text_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_update_keeps_likes_comments_and_creation_date() {
    let created = campus_now() - Duration::days(2);
    let mut termo = item("termo", "Termo", "ana", created);
    termo.likes.push(py_core::UserId::new("luis"));
    termo.comments.push(Comment::authored(&viewer("luis", true), "Lindo termo", false, created));
    let harness = Harness::new(FakeStore::with_items(vec![termo]));
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    let mut edit = draft("Termo verde");
    edit.id = Some(ItemId::new("termo"));
    let saved = assert_ok!(session.save_item(edit, None).await);

    assert_eq!(saved.name, "Termo verde");
    assert_eq!(saved.created_at, created);
    assert_eq!(saved.posted_at, created);
    assert_eq!(saved.like_count(), 1);
    assert_eq!(saved.comments.len(), 1);
    assert_eq!(saved.image_url, "/media/items/termo/image");
    assert_eq!(session.feed().item(&ItemId::new("termo")).unwrap().name, "Termo verde");
}

#[tokio::test]
async fn test_declined_delete_keeps_the_item() {
    let harness = Harness::new(FakeStore::with_items(vec![item("termo", "Termo", "ana", campus_now())]));
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    let outcome = assert_ok!(session.delete_item(&ItemId::new("termo"), Confirmation::Declined).await);
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    assert_eq!(harness.store.len(), 1);
    assert_eq!(session.feed().len(), 1);
}

#[tokio::test]
async fn test_confirmed_delete_removes_item_and_image() {
    let harness = Harness::new(FakeStore::with_items(vec![item("termo", "Termo", "ana", campus_now())]));
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);

    let outcome = assert_ok!(session.delete_item(&ItemId::new("termo"), Confirmation::Confirmed).await);
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(session.feed().is_empty());
    assert_eq!(harness.store.len(), 0);
    assert_eq!(*harness.storage.deletes.lock().unwrap(), vec!["items/termo/image".to_string()]);
}

#[tokio::test]
async fn test_failed_delete_puts_the_item_back() {
    let harness = Harness::new(FakeStore::with_items(vec![item("termo", "Termo", "ana", campus_now())]));
    let session = harness.session(Some(viewer("ana", true)));
    assert_ok!(session.enter().await);
    harness.store.fail_writes.store(true, Ordering::SeqCst);

    let err = assert_err!(session.delete_item(&ItemId::new("termo"), Confirmation::Confirmed).await);
    assert!(matches!(err, AppError::RemoteWriteFailed(_)));
    assert!(session.feed().item(&ItemId::new("termo")).is_some());
    assert!(harness.storage.deletes.lock().unwrap().is_empty());
}
