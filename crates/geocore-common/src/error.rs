//! Error taxonomy for the harvester
//!
//! Every stage maps its collaborator failures into one of these variants at
//! the boundary. Translation errors stay scoped to one record and page errors
//! to one job; only [`HarvestError::Config`] is fatal at startup.

use thiserror::Error;

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Main error type for the harvester
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("State store error: {0}")]
    State(String),

    #[error(
        "Counter overflow for batch {batch_id}: finished {finished} + {delta} exceeds total {total}"
    )]
    CounterOverflow {
        batch_id: String,
        finished: i64,
        delta: i64,
        total: i64,
    },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Short category name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::Fetch(_) | HarvestError::HttpStatus { .. } => "fetch",
            HarvestError::Parse(_) | HarvestError::Serialization(_) => "parse",
            HarvestError::Storage(_) | HarvestError::Io(_) => "storage",
            HarvestError::State(_) | HarvestError::CounterOverflow { .. } => "state",
            HarvestError::Queue(_) => "queue",
            HarvestError::Config(_) => "config",
        }
    }

    /// Whether a later redelivery of the same job can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::Fetch(_)
                | HarvestError::HttpStatus { .. }
                | HarvestError::Storage(_)
                | HarvestError::Io(_)
                | HarvestError::Queue(_)
        )
    }
}
