use geocore_common::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default region when none is configured.
pub const DEFAULT_S3_REGION: &str = "ca-central-1";

/// Default root directory for the filesystem backend.
pub const DEFAULT_STORAGE_ROOT: &str = "./data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    #[serde(rename = "fs")]
    Filesystem,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "fs" | "filesystem" | "file" => Ok(StorageBackend::Filesystem),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(HarvestError::Config(format!("unknown STORAGE_BACKEND '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend; buckets are subdirectories
    pub root: PathBuf,
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl StorageConfig {
    /// Read `STORAGE_BACKEND`, `STORAGE_ROOT` and the `S3_*` settings
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            backend: match lookup("STORAGE_BACKEND") {
                Some(value) => value.parse()?,
                None => defaults.backend,
            },
            root: lookup("STORAGE_ROOT").map(PathBuf::from).unwrap_or(defaults.root),
            endpoint: lookup("S3_ENDPOINT"),
            region: lookup("S3_REGION")
                .or_else(|| lookup("AWS_REGION"))
                .unwrap_or(defaults.region),
            access_key: lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID")),
            secret_key: lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY")),
            path_style: lookup("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.path_style),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
            ..Self::default()
        }
    }

    pub fn for_directory(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            root: root.into(),
            ..Self::default()
        }
    }

    pub(crate) fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }
}
