//! Article image storage
//!
//! Each article holds at most one image. The filesystem store keeps it under
//! `<upload.path>/articles/<article_id>/`; attaching replaces whatever was
//! there before.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

/// An uploaded image, already checked against the upload config
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub extension: &'static str,
    pub data: Vec<u8>,
}

/// Details of a stored image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImage {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `upload` as the image of `article_id`, replacing any previous one
    async fn attach(&self, article_id: i64, upload: ImageUpload) -> Result<StoredImage>;

    /// Remove the image of `article_id`. Returns whether one was attached.
    async fn purge(&self, article_id: i64) -> Result<bool>;

    async fn is_attached(&self, article_id: i64) -> Result<bool>;
}

/// Filesystem-backed image store
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(upload_path: impl Into<PathBuf>) -> Self {
        Self {
            root: upload_path.into(),
        }
    }

    fn article_dir(&self, article_id: i64) -> PathBuf {
        self.root.join("articles").join(article_id.to_string())
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn attach(&self, article_id: i64, upload: ImageUpload) -> Result<StoredImage> {
        self.purge(article_id).await?;

        let dir = self.article_dir(article_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

        let filename = format!("{}.{}", Uuid::new_v4(), upload.extension);
        let path = dir.join(&filename);
        fs::write(&path, &upload.data)
            .await
            .with_context(|| format!("Failed to save image {}", path.display()))?;

        tracing::info!(
            article_id,
            original = %upload.filename,
            size = upload.data.len(),
            "Image attached"
        );

        Ok(StoredImage {
            filename,
            content_type: upload.content_type,
            size: upload.data.len() as u64,
        })
    }

    async fn purge(&self, article_id: i64) -> Result<bool> {
        let dir = self.article_dir(article_id);
        let attached = self.is_attached(article_id).await?;

        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", dir.display()));
            }
        }

        if attached {
            tracing::info!(article_id, "Image purged");
        }
        Ok(attached)
    }

    async fn is_attached(&self, article_id: i64) -> Result<bool> {
        let dir = self.article_dir(article_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", dir.display()));
            }
        };

        Ok(entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to read {}", dir.display()))?
            .is_some())
    }
}

/// In-memory store for tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryImageStore {
    images: tokio::sync::RwLock<std::collections::HashMap<i64, StoredImage>>,
}

#[cfg(test)]
#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn attach(&self, article_id: i64, upload: ImageUpload) -> Result<StoredImage> {
        let stored = StoredImage {
            filename: format!("{}.{}", article_id, upload.extension),
            content_type: upload.content_type,
            size: upload.data.len() as u64,
        };
        self.images.write().await.insert(article_id, stored.clone());
        Ok(stored)
    }

    async fn purge(&self, article_id: i64) -> Result<bool> {
        Ok(self.images.write().await.remove(&article_id).is_some())
    }

    async fn is_attached(&self, article_id: i64) -> Result<bool> {
        Ok(self.images.read().await.contains_key(&article_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn png(bytes: &[u8]) -> ImageUpload {
        ImageUpload {
            filename: "cover.png".to_string(),
            content_type: "image/png".to_string(),
            extension: "png",
            data: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_attach_writes_under_article_directory() {
        let dir = tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let stored = store.attach(7, png(b"\x89PNG data")).await.unwrap();

        assert!(stored.filename.ends_with(".png"));
        assert_eq!(stored.size, 9);
        let path = dir.path().join("articles").join("7").join(&stored.filename);
        assert_eq!(std::fs::read(path).unwrap(), b"\x89PNG data");
        assert!(store.is_attached(7).await.unwrap());
        assert!(!store.is_attached(8).await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_replaces_previous_image() {
        let dir = tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        store.attach(1, png(b"first")).await.unwrap();
        let second = store.attach(1, png(b"second")).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("articles").join("1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec![second.filename]);
    }

    #[tokio::test]
    async fn test_purge_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsImageStore::new(dir.path());
        store.attach(3, png(b"data")).await.unwrap();

        assert!(store.purge(3).await.unwrap());
        assert!(!store.is_attached(3).await.unwrap());
        assert!(!store.purge(3).await.unwrap());
        assert!(!store.purge(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryImageStore::default();
        store.attach(1, png(b"x")).await.unwrap();
        assert!(store.is_attached(1).await.unwrap());
        assert!(store.purge(1).await.unwrap());
        assert!(!store.purge(1).await.unwrap());
    }
}
