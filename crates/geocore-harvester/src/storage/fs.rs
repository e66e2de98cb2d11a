//! Filesystem-backed object store
//!
//! Buckets map to directories under a root; writes go through a temporary
//! file and a rename so readers never observe a half-written object.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

use super::{ObjectStore, PutReceipt};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if bucket.is_empty() || key.is_empty() || escapes {
            return Err(HarvestError::Storage(format!(
                "invalid object location {}/{}",
                bucket, key
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HarvestError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, data))]
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<PutReceipt> {
        let path = self.object_path(bucket, key)?;
        let receipt = PutReceipt::new(bucket, key, &data);
        let storage_err =
            |e: std::io::Error| HarvestError::Storage(format!("failed to write {}: {}", path.display(), e));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        let staging = path.with_extension(format!("{}.partial", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&staging, &data).await.map_err(storage_err)?;
        tokio::fs::rename(&staging, &path).await.map_err(storage_err)?;

        debug!(path = %path.display(), size = receipt.size, "Wrote object");
        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HarvestError::Storage(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
