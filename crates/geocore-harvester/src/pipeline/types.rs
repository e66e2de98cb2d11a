//! Messages and artifacts exchanged between pipeline stages

use chrono::{DateTime, NaiveDateTime, Utc};
use geocore_common::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{JobState, JobStatus};

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One page of items found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    #[serde(rename = "collection")]
    pub collection_id: String,
    #[serde(rename = "item_api")]
    pub source_page_url: String,
    #[serde(rename = "created_at", with = "created_at")]
    pub discovered_at: DateTime<Utc>,
}

impl PageDescriptor {
    pub fn new(collection_id: impl Into<String>, source_page_url: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            source_page_url: source_page_url.into(),
            discovered_at: Utc::now(),
        }
    }
}

mod created_at {
    use super::CREATED_AT_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(CREATED_AT_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, CREATED_AT_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Persisted page list, one JSON array per collection
pub fn encode_page_list(pages: &[PageDescriptor]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(pages)?)
}

pub fn decode_page_list(data: &[u8]) -> Result<Vec<PageDescriptor>> {
    serde_json::from_slice(data).map_err(|e| HarvestError::Parse(format!("invalid page list: {}", e)))
}

/// State carried inside a job message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    pub scatter_gather_id: String,
    pub process_id: String,
    pub status: JobStatus,
}

impl From<&JobState> for ItemState {
    fn from(state: &JobState) -> Self {
        Self {
            scatter_gather_id: state.scatter_gather_id.clone(),
            process_id: state.process_id.clone(),
            status: state.status,
        }
    }
}

/// Fan-out message, one per page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    #[serde(rename = "item-api")]
    pub item_api: String,
    pub index: usize,
    pub item_state: ItemState,
}

impl JobMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| HarvestError::Parse(format!("invalid job message: {}", e)))
    }

    pub fn batch_id(&self) -> &str {
        &self.item_state.scatter_gather_id
    }

    pub fn job_id(&self) -> &str {
        &self.item_state.process_id
    }
}

/// Sent by a worker after it moved its job to `finished`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub scatter_gather_id: String,
    pub process_id: String,
}

impl CompletionSignal {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| HarvestError::Parse(format!("invalid completion signal: {}", e)))
    }
}

/// Job id of the page at `index`
pub fn job_id(index: usize, page_url: &str) -> String {
    format!("{}_{}", index, page_url)
}

/// `{unix_seconds}-{8 hex chars}`
pub fn new_batch_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp(), &suffix[..8])
}

pub fn item_key(source: &str, collection_id: &str, item_id: &str) -> String {
    format!("{}-{}-{}.geojson", source, collection_id, item_id)
}

pub fn collection_key(source: &str, collection_id: &str) -> String {
    format!("{}-collection-{}.geojson", source, collection_id)
}

pub fn root_key(source: &str, root_id: &str) -> String {
    format!("{}-root-{}.geojson", source, root_id)
}

pub fn page_list_key(collection_id: &str) -> String {
    format!("{}-item-api.json", collection_id)
}

pub fn manifest_key(source: &str, collection_id: &str, index: usize) -> String {
    format!("lastRun_{}_{}_{}.txt", source, collection_id, index)
}

/// Timestamps as written to the page list
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
