//! Object storage for binary payloads such as drawings.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;

use crate::types::{StorageError, StorageResult};

/// Stored object as kept by [`MemoryObjectStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` and return a retrievable reference (a URL).
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> StorageResult<String>;
}

fn validate_path(path: &str) -> StorageResult<&Path> {
    let relative = Path::new(path);
    let valid = !path.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if valid {
        Ok(relative)
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

/// Objects written below a local directory and addressed through a base URL.
pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reference(&self, path: &str) -> String {
        if self.public_base_url.is_empty() {
            return format!("file://{}", self.root.join(path).display());
        }
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> StorageResult<String> {
        let target = self.root.join(validate_path(path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {e}", target.display())))?;

        info!(path, content_type, size = bytes.len(), "stored object");
        Ok(self.reference(path))
    }
}

/// In-process object storage.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> StorageResult<String> {
        validate_path(path)?;
        self.objects.write().await.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{path}"))
    }
}
