//! perdidos-ya/crates/py-core/src/lib.rs
//!
//! The central domain logic and interface definitions for PerdidosYa!.

pub mod calendar;
pub mod classify;
pub mod error;
pub mod filter;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use classify::{classify, effective_type, is_recent, Classification};
pub use error::*;
pub use filter::{DateBucket, FilterState, LocationFilter, Tab};
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::{Duration, Utc};

    fn viewer(name: Option<&str>) -> Viewer {
        Viewer {
            uid: UserId::new("u-42"),
            email: Some("ana@uni.edu".into()),
            display_name: name.map(str::to_string),
            photo_url: Some("https://img/ana.png".into()),
            email_verified: true,
        }
    }

    #[test]
    fn test_item_document_shape() {
        let now = Utc::now();
        let item = Item {
            id: ItemId::new("abc"),
            name: "Paraguas".into(),
            description: "Negro".into(),
            image_url: "/media/items/abc/image".into(),
            location: Some(Location::EdificioAula),
            item_type: Some(ItemType::Found),
            author_id: UserId::new("u-42"),
            author_name: "Ana".into(),
            author_email: None,
            author_photo_url: None,
            is_anonymous: false,
            created_at: now - Duration::hours(1),
            posted_at: now - Duration::hours(1),
            updated_at: now,
            likes: vec![UserId::new("u-7")],
            comments: vec![],
        };

        let doc = serde_json::to_value(&item).unwrap();
        assert_eq!(doc["type"], "encontrado");
        assert_eq!(doc["location"], "Edificio/Aula");
        assert_eq!(doc["authorId"], "u-42");
        assert_eq!(doc["likes"][0], "u-7");

        let back: Item = serde_json::from_value(doc).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_legacy_document_without_type() {
        let doc = serde_json::json!({
            "id": "old",
            "name": "Llaves",
            "authorId": "u-1",
            "authorName": "Luis",
            "createdAt": "2023-01-01T10:00:00Z",
            "updatedAt": "2023-01-01T10:00:00Z"
        });
        let item: Item = serde_json::from_value(doc).unwrap();
        assert_eq!(item.item_type, None);
        assert!(item.likes.is_empty());
    }

    #[test]
    fn test_like_membership_has_no_duplicates() {
        let mut item: Item = serde_json::from_value(serde_json::json!({
            "id": "i", "name": "n", "authorId": "a", "authorName": "A",
            "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let user = UserId::new("u");

        item.set_liked(&user, true);
        item.set_liked(&user, true);
        assert_eq!(item.like_count(), 1);

        assert!(!item.toggle_like(&user));
        assert_eq!(item.like_count(), 0);
    }

    #[test]
    fn test_anonymous_comment_hides_identity() {
        let v = viewer(Some("Ana"));
        let anon = Comment::authored(&v, "  Lo vi en la cafetería ", true, Utc::now());
        assert_eq!(anon.author_name, ANONYMOUS_NAME);
        assert_eq!(anon.author_email, None);
        assert_eq!(anon.author_photo_url, None);
        assert_eq!(anon.author_id, v.uid);
        assert_eq!(anon.text, "Lo vi en la cafetería");

        let named = Comment::authored(&viewer(None), "hola", false, Utc::now());
        assert_eq!(named.author_name, FALLBACK_NAME);
        assert_eq!(named.author_email.as_deref(), Some("ana@uni.edu"));
    }
}
