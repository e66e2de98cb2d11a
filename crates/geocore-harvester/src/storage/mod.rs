//! Object storage for translated records, page lists and run manifests
//!
//! Keys are deterministic and `put` overwrites, so writing the same record
//! twice leaves one object with the latest bytes.

use async_trait::async_trait;
use geocore_common::{checksum::compute_sha256, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod config;
pub mod fs;
pub mod s3;

pub use config::{StorageBackend, StorageConfig};
pub use fs::FsObjectStore;
pub use s3::S3ObjectStore;

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub bucket: String,
    pub key: String,
    pub checksum: String,
    pub size: usize,
}

impl PutReceipt {
    pub(crate) fn new(bucket: &str, key: &str, data: &[u8]) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            checksum: compute_sha256(data),
            size: data.len(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when the key does not exist
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or overwrite an object
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<PutReceipt>;

    /// Remove an object; deleting a missing key is not an error
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Build the configured backend
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match config.backend {
        StorageBackend::S3 => Arc::new(S3ObjectStore::new(config).await?),
        StorageBackend::Filesystem => Arc::new(FsObjectStore::new(&config.root)),
        StorageBackend::Memory => Arc::new(InMemoryObjectStore::new()),
    })
}

pub(crate) fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("geojson") => "application/geo+json",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Process-local store used by `STORAGE_BACKEND=memory` and tests
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted keys currently stored in `bucket`
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<PutReceipt> {
        let receipt = PutReceipt::new(bucket, key, &data);
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(receipt)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
