//! # py-storage-local
//!
//! Local filesystem implementation of `ObjectStorage`.
//! Objects live under a root directory at their logical path; image uploads
//! also get a 250px WebP thumbnail next to them.

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use py_core::traits::ObjectStorage;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Longest edge of generated thumbnails, in pixels.
const THUMBNAIL_EDGE: u32 = 250;

pub struct LocalObjectStorage {
    /// Root directory for all objects (e.g., "./data/media")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/media")
    url_prefix: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let url_prefix: String = url_prefix.into();
        Self {
            root_path: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Maps a logical object path onto the filesystem. Only plain relative
    /// segments are accepted.
    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("invalid object path: {path:?}");
        }
        Ok(self.root_path.join(relative))
    }

    /// Sibling path of the thumbnail for the object at `target`.
    pub fn thumbnail_path(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_os_string();
        name.push(".thumb.webp");
        PathBuf::from(name)
    }
}

/// Decodes `data` and writes a WebP thumbnail to `thumb_path`. CPU bound.
fn write_thumbnail(data: &[u8], thumb_path: &Path) -> anyhow::Result<()> {
    let img = image::load_from_memory(data)?;

    let thumb = img.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);
    // The WebP encoder only takes 8-bit RGB(A).
    image::DynamicImage::ImageRgba8(thumb.to_rgba8())
        .save_with_format(thumb_path, image::ImageFormat::WebP)?;
    Ok(())
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    /// Writes (or overwrites) the object, then its thumbnail when the payload
    /// is an image. A thumbnail failure does not fail the upload.
    async fn upload_file(&self, path: &str, bytes: Bytes, content_type: &str) -> anyhow::Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&target, &bytes)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        debug!(path, size = bytes.len(), content_type, "object stored");

        if content_type.starts_with("image/") {
            let thumb_path = Self::thumbnail_path(&target);
            let outcome =
                tokio::task::spawn_blocking(move || write_thumbnail(&bytes, &thumb_path)).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(path, error = %err, "thumbnail generation failed"),
                Err(err) => warn!(path, error = %err, "thumbnail task aborted"),
            }
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path.trim_start_matches('/'))
    }

    /// Removes the object and its thumbnail. Missing files are not an error.
    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        let target = self.resolve(path)?;
        for file in [Self::thumbnail_path(&target), target] {
            match fs::remove_file(&file).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err).with_context(|| format!("removing {}", file.display())),
            }
        }
        Ok(())
    }
}
