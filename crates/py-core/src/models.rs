//! # Domain Models
//!
//! These structs represent the core entities of PerdidosYa!.
//! Field names serialize in camelCase so a record matches the stored document shape.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author name shown for anonymous posts and comments.
pub const ANONYMOUS_NAME: &str = "Anónimo";

/// Author name used when the account has no display name.
pub const FALLBACK_NAME: &str = "Usuario";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque identifier of an Item, assigned at creation and never changed.
    ItemId
);
string_id!(
    /// Opaque identifier of a Comment, generated client-side.
    CommentId
);
string_id!(
    /// Account identifier issued by the authentication provider.
    UserId
);

impl ItemId {
    /// Mints a fresh id for a new item.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Object-storage path of the item's image.
    pub fn image_path(&self) -> String {
        format!("items/{}/image", self.0)
    }
}

impl CommentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Campus places an item can be reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "Cafetería")]
    Cafeteria,
    #[serde(rename = "Biblioteca")]
    Biblioteca,
    #[serde(rename = "Gimnasio")]
    Gimnasio,
    #[serde(rename = "Plazoleta")]
    Plazoleta,
    #[serde(rename = "Auditorio")]
    Auditorio,
    #[serde(rename = "Edificio/Aula")]
    EdificioAula,
    #[serde(rename = "Otros")]
    Otros,
}

impl Location {
    pub const ALL: [Location; 7] = [
        Location::Cafeteria,
        Location::Biblioteca,
        Location::Gimnasio,
        Location::Plazoleta,
        Location::Auditorio,
        Location::EdificioAula,
        Location::Otros,
    ];

    /// The stored (and displayed) label.
    pub fn label(self) -> &'static str {
        match self {
            Location::Cafeteria => "Cafetería",
            Location::Biblioteca => "Biblioteca",
            Location::Gimnasio => "Gimnasio",
            Location::Plazoleta => "Plazoleta",
            Location::Auditorio => "Auditorio",
            Location::EdificioAula => "Edificio/Aula",
            Location::Otros => "Otros",
        }
    }

    /// Generic places need the exact spot written in the description.
    pub fn detail_hint(self) -> Option<&'static str> {
        match self {
            Location::EdificioAula => {
                Some("Por favor, especifica el edificio y aula en la descripción")
            }
            Location::Otros => Some("Por favor, especifica la ubicación en la descripción"),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .into_iter()
            .find(|loc| loc.label() == s)
            .ok_or_else(|| format!("unknown location: {s}"))
    }
}

/// Whether the reporter lost the item or found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    #[serde(rename = "perdido")]
    Lost,
    #[serde(rename = "encontrado")]
    Found,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Lost => "perdido",
            ItemType::Found => "encontrado",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemType::Lost => "Perdido",
            ItemType::Found => "Encontrado",
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perdido" => Ok(ItemType::Lost),
            "encontrado" => Ok(ItemType::Found),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// A reply attached to exactly one Item. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author_id: UserId,
    pub author_name: String,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default, rename = "authorPhotoURL")]
    pub author_photo_url: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Builds a comment on behalf of `viewer`. Anonymous comments hide the
    /// author's name, e-mail and photo.
    pub fn authored(viewer: &Viewer, text: &str, anonymous: bool, now: DateTime<Utc>) -> Self {
        let (author_name, author_email, author_photo_url) = if anonymous {
            (ANONYMOUS_NAME.to_string(), None, None)
        } else {
            (
                viewer.display_name_or_fallback().to_string(),
                viewer.email.clone(),
                viewer.photo_url.clone(),
            )
        };

        Self {
            id: CommentId::generate(),
            text: text.trim().to_string(),
            author_id: viewer.uid.clone(),
            author_name,
            author_email,
            author_photo_url,
            is_anonymous: anonymous,
            created_at: now,
        }
    }
}

/// A lost/found report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub location: Option<Location>,
    /// Absent on legacy records; see `classify::effective_type`.
    #[serde(default, rename = "type")]
    pub item_type: Option<ItemType>,
    pub author_id: UserId,
    pub author_name: String,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default, rename = "authorPhotoURL")]
    pub author_photo_url: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    /// The reported date. Drives ordering and display.
    pub created_at: DateTime<Utc>,
    /// When the item was actually submitted. Daily quotas count this.
    #[serde(default)]
    pub posted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// User ids; each appears at most once.
    #[serde(default)]
    pub likes: Vec<UserId>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Item {
    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.likes.contains(user)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    /// Forces membership of `user` in `likes` without creating duplicates.
    pub fn set_liked(&mut self, user: &UserId, liked: bool) {
        if liked {
            if !self.is_liked_by(user) {
                self.likes.push(user.clone());
            }
        } else {
            self.likes.retain(|id| id != user);
        }
    }

    /// Flips membership of `user`; returns whether the user now likes the item.
    pub fn toggle_like(&mut self, user: &UserId) -> bool {
        let liked = !self.is_liked_by(user);
        self.set_liked(user, liked);
        liked
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    /// Number of comments `author` holds on this item.
    pub fn comments_by(&self, author: &UserId) -> usize {
        self.comments.iter().filter(|c| &c.author_id == author).count()
    }

    pub fn is_authored_by(&self, user: &UserId) -> bool {
        &self.author_id == user
    }
}

/// Snapshot of the authenticated identity, threaded explicitly to whoever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
}

impl Viewer {
    pub fn display_name_or_fallback(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_NAME)
    }
}

/// Continuation marker referencing the last loaded item.
///
/// Built only from an item, so it always points at a real position in the
/// `createdAt DESC` ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    created_at: DateTime<Utc>,
    id: ItemId,
}

impl PageCursor {
    pub fn after(item: &Item) -> Self {
        Self {
            created_at: item.created_at,
            id: item.id.clone(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn item_id(&self) -> &ItemId {
        &self.id
    }
}

/// Form data for creating (no `id`) or updating (`id` set) an item.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub id: Option<ItemId>,
    pub name: String,
    pub description: String,
    pub location: Option<Location>,
    pub item_type: ItemType,
    pub is_anonymous: bool,
    /// Date the object was lost or found; becomes `createdAt` on creation.
    pub reported_at: Option<DateTime<Utc>>,
    /// Image reference kept from a prior version of the item.
    pub image_url: Option<String>,
}

/// An image selected for upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// MIME type guessed from the file name.
    pub fn content_type(&self) -> Option<mime::Mime> {
        mime_guess::from_path(&self.file_name).first()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Outcome of a moderation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub is_valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ModerationVerdict {
    pub fn approved() -> Self {
        Self {
            is_valid: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
        }
    }
}

/// One e-mail announcing a new comment to everyone involved in an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNotification {
    pub recipient_email: String,
    pub recipient_name: String,
    pub bcc_emails: Vec<String>,
    pub item_name: String,
    pub item_url: String,
    pub comment_author: String,
    pub comment_text: String,
}

impl CommentNotification {
    pub fn subject(&self) -> String {
        format!("Nuevo comentario en \"{}\" - PerdidosYa!", self.item_name)
    }
}

/// A signed-in session as issued by the authentication provider.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: Viewer,
}
