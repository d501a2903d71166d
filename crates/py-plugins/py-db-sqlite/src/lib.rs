//! # py-db-sqlite Implementation
//!
//! This module implements the data mapping between SQLite rows and the
//! `py-core` domain models. Each item is one row shaped like the stored
//! document: likes and comments live in JSON array columns, timestamps are
//! unix milliseconds.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use py_core::models::{Comment, Item, ItemId, PageCursor, UserId};
use py_core::traits::ItemStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS items (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    image_url        TEXT NOT NULL DEFAULT '',
    location         TEXT,
    item_type        TEXT,
    author_id        TEXT NOT NULL,
    author_name      TEXT NOT NULL,
    author_email     TEXT,
    author_photo_url TEXT,
    is_anonymous     INTEGER NOT NULL DEFAULT 0,
    created_at       INTEGER NOT NULL,
    posted_at        INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL,
    likes            TEXT NOT NULL DEFAULT '[]',
    comments         TEXT NOT NULL DEFAULT '[]'
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_items_feed ON items (created_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_items_author_posted ON items (author_id, posted_at)",
];

const ITEM_COLUMNS: &str = "id, name, description, image_url, location, item_type, author_id, \
    author_name, author_email, author_photo_url, is_anonymous, created_at, posted_at, updated_at, likes, comments";

pub struct SqliteItemStore {
    pool: SqlitePool,
}

// Helpers for timestamp conversion
fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("timestamp out of range: {ms}"))
}

fn row_to_item(row: &SqliteRow) -> anyhow::Result<Item> {
    let location: Option<String> = row.try_get("location")?;
    let item_type: Option<String> = row.try_get("item_type")?;
    let likes: String = row.try_get("likes")?;
    let comments: String = row.try_get("comments")?;

    Ok(Item {
        id: ItemId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        // Unknown labels from older data are dropped rather than failing the page.
        location: location.and_then(|s| s.parse().ok()),
        item_type: item_type.and_then(|s| s.parse().ok()),
        author_id: UserId::new(row.try_get::<String, _>("author_id")?),
        author_name: row.try_get("author_name")?,
        author_email: row.try_get("author_email")?,
        author_photo_url: row.try_get("author_photo_url")?,
        is_anonymous: row.try_get("is_anonymous")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        posted_at: from_millis(row.try_get("posted_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        likes: serde_json::from_str(&likes).context("decoding likes")?,
        comments: serde_json::from_str(&comments).context("decoding comments")?,
    })
}

impl SqliteItemStore {
    /// Connects (creating the database file if needed) and applies the schema.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to `:memory:` is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to {url}"))?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    async fn read_json_column<T: serde::de::DeserializeOwned>(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        column: &str,
        item_id: &ItemId,
    ) -> anyhow::Result<T> {
        let raw: String = sqlx::query(&format!("SELECT {column} FROM items WHERE id = ?"))
            .bind(item_id.as_str())
            .fetch_optional(&mut **tx)
            .await?
            .with_context(|| format!("item {item_id} not found"))?
            .try_get(0)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_json_column<T: serde::Serialize>(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        column: &str,
        item_id: &ItemId,
        value: &T,
    ) -> anyhow::Result<()> {
        sqlx::query(&format!("UPDATE items SET {column} = ? WHERE id = ?"))
            .bind(serde_json::to_string(value)?)
            .bind(item_id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    /// Newest first. Ties on `created_at` are broken by id so pages never overlap.
    async fn query_items_page(
        &self,
        page_size: usize,
        after: Option<PageCursor>,
    ) -> anyhow::Result<Vec<Item>> {
        let limit = i64::try_from(page_size)?;
        let rows = match &after {
            Some(cursor) => {
                let at = to_millis(cursor.created_at());
                sqlx::query(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items \
                     WHERE created_at < ? OR (created_at = ? AND id < ?) \
                     ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(at)
                .bind(at)
                .bind(cursor.item_id().as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        debug!(page_size, returned = rows.len(), "items page queried");
        rows.iter().map(row_to_item).collect()
    }

    async fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    /// Inserts a new row, or merges fields into an existing one. Likes,
    /// comments, `created_at` and `posted_at` of an existing row are left alone.
    async fn upsert_item(&self, item: &Item) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO items (id, name, description, image_url, location, item_type, author_id, \
                 author_name, author_email, author_photo_url, is_anonymous, created_at, posted_at, updated_at, likes, comments) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 name = excluded.name, \
                 description = excluded.description, \
                 image_url = excluded.image_url, \
                 location = excluded.location, \
                 item_type = excluded.item_type, \
                 is_anonymous = excluded.is_anonymous, \
                 updated_at = excluded.updated_at",
        )
        .bind(item.id.as_str())
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.image_url)
        .bind(item.location.map(|l| l.label()))
        .bind(item.item_type.map(|t| t.as_str()))
        .bind(item.author_id.as_str())
        .bind(&item.author_name)
        .bind(&item.author_email)
        .bind(&item.author_photo_url)
        .bind(item.is_anonymous)
        .bind(to_millis(item.created_at))
        .bind(to_millis(item.posted_at))
        .bind(to_millis(item.updated_at))
        .bind(serde_json::to_string(&item.likes)?)
        .bind(serde_json::to_string(&item.comments)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_item(&self, id: &ItemId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_comment(&self, item_id: &ItemId, comment: &Comment) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut comments: Vec<Comment> = self.read_json_column(&mut tx, "comments", item_id).await?;
        if !comments.iter().any(|c| c.id == comment.id) {
            comments.push(comment.clone());
        }
        self.write_json_column(&mut tx, "comments", item_id, &comments).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_comment(&self, item_id: &ItemId, comment: &Comment) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut comments: Vec<Comment> = self.read_json_column(&mut tx, "comments", item_id).await?;
        comments.retain(|c| c.id != comment.id);
        self.write_json_column(&mut tx, "comments", item_id, &comments).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn toggle_like(&self, item_id: &ItemId, user_id: &UserId) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut likes: Vec<UserId> = self.read_json_column(&mut tx, "likes", item_id).await?;
        let liked = if likes.contains(user_id) {
            likes.retain(|u| u != user_id);
            false
        } else {
            likes.push(user_id.clone());
            true
        };
        self.write_json_column(&mut tx, "likes", item_id, &likes).await?;
        tx.commit().await?;
        Ok(liked)
    }

    async fn count_items_by_author_in_range(
        &self,
        author_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE author_id = ? AND posted_at >= ? AND posted_at <= ?",
        )
        .bind(author_id.as_str())
        .bind(to_millis(start))
        .bind(to_millis(end))
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count)?)
    }
}
