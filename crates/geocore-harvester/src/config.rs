//! Harvester configuration
//!
//! Settings come from the environment (optionally seeded from a `.env`
//! file). Missing required settings are fatal at startup.

use geocore_common::{HarvestError, Result};
use std::path::PathBuf;

use crate::geocore::{StaticMetadata, TranslationConfig};
use crate::storage::StorageConfig;

// ============================================================================
// Harvest Defaults
// ============================================================================

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 5000;

/// Default number of jobs processed at once.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 8;

/// Default deliveries before a job message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Default timeout for one request to the source API.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = crate::http::DEFAULT_TIMEOUT_SECS;

/// Default number of completion signals applied per window.
pub const DEFAULT_AGGREGATOR_BATCH_SIZE: usize = crate::pipeline::aggregator::DEFAULT_BATCH_SIZE;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Landing page of the STAC API
    pub api_root: String,
    pub collection: String,
    pub source: String,
    pub source_system_name: String,
    /// `"English / Français"` root catalog name
    pub root_name: String,
    pub processed_data_bucket: String,
    pub item_link_bucket: String,
    pub run_log_bucket: String,

    pub page_size: u32,
    pub max_pages: Option<usize>,
    pub worker_concurrency: usize,
    pub max_delivery_attempts: u32,
    pub http_timeout_secs: u64,
    pub aggregator_batch_size: usize,

    /// Postgres state and queues; in-memory when unset
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub storage: StorageConfig,
    /// JSON file overriding the static bilingual metadata
    pub translation_config_path: Option<PathBuf>,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| HarvestError::Config(format!("{} must be set", name)))
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HarvestError::Config(format!("{} has an invalid value '{}'", name, raw))),
    }
}

impl HarvesterConfig {
    /// Load from `.env` and the process environment, then validate
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            api_root: required(&lookup, "API_ROOT")?,
            collection: required(&lookup, "COLLECTION")?,
            source: required(&lookup, "SOURCE")?,
            source_system_name: required(&lookup, "SOURCE_SYSTEM_NAME")?,
            root_name: required(&lookup, "ROOT_NAME")?,
            processed_data_bucket: required(&lookup, "PROCESSED_DATA_BUCKET_NAME")?,
            item_link_bucket: required(&lookup, "ITEM_LINK_BUCKET_NAME")?,
            run_log_bucket: required(&lookup, "RUN_LOG_BUCKET_NAME")?,
            page_size: parsed(&lookup, "PAGE_SIZE")?.unwrap_or(DEFAULT_PAGE_SIZE),
            max_pages: parsed(&lookup, "MAX_PAGES")?,
            worker_concurrency: parsed(&lookup, "WORKER_CONCURRENCY")?
                .unwrap_or(DEFAULT_WORKER_CONCURRENCY),
            max_delivery_attempts: parsed(&lookup, "MAX_DELIVERY_ATTEMPTS")?
                .unwrap_or(DEFAULT_MAX_DELIVERY_ATTEMPTS),
            http_timeout_secs: parsed(&lookup, "HTTP_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            aggregator_batch_size: parsed(&lookup, "AGGREGATOR_BATCH_SIZE")?
                .unwrap_or(DEFAULT_AGGREGATOR_BATCH_SIZE),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            storage: StorageConfig::from_lookup(&lookup)?,
            translation_config_path: lookup("TRANSLATION_CONFIG_PATH").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_root.starts_with("http://") && !self.api_root.starts_with("https://") {
            return Err(HarvestError::Config(format!(
                "API_ROOT must be an http(s) URL, got '{}'",
                self.api_root
            )));
        }
        if self.page_size == 0 {
            return Err(HarvestError::Config("PAGE_SIZE must be greater than 0".into()));
        }
        if self.worker_concurrency == 0 {
            return Err(HarvestError::Config("WORKER_CONCURRENCY must be greater than 0".into()));
        }
        if self.max_delivery_attempts == 0 {
            return Err(HarvestError::Config("MAX_DELIVERY_ATTEMPTS must be greater than 0".into()));
        }
        if self.aggregator_batch_size == 0 {
            return Err(HarvestError::Config("AGGREGATOR_BATCH_SIZE must be greater than 0".into()));
        }
        if self.max_pages == Some(0) {
            return Err(HarvestError::Config("MAX_PAGES must be greater than 0 when set".into()));
        }
        if !self.root_name.contains('/') {
            tracing::warn!(
                root_name = %self.root_name,
                "ROOT_NAME has no '/', using the same name in both languages"
            );
        }
        Ok(())
    }

    /// Static translation input, with the metadata override applied
    pub fn translation_config(&self) -> Result<TranslationConfig> {
        let config = TranslationConfig::new(
            self.source.as_str(),
            self.source_system_name.as_str(),
            &self.root_name,
            self.collection.as_str(),
        );
        match &self.translation_config_path {
            Some(path) => Ok(config.with_metadata(StaticMetadata::from_json_file(path)?)),
            None => Ok(config),
        }
    }
}
