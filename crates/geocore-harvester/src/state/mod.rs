//! Batch counters and per-job state
//!
//! One [`BatchCounter`] row per discovery run tracks total versus finished
//! jobs; one [`JobState`] row per page tracks whether that page's job has
//! completed. Counters only move forward and never pass the total, job
//! states only move `started` -> `finished`, and each finished job adds to
//! its counter at most once.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStateStore;
pub use postgres::PgStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Finished,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "started" => Ok(JobStatus::Started),
            "finished" => Ok(JobStatus::Finished),
            other => Err(HarvestError::State(format!("unknown job status '{}'", other))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate row of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounter {
    pub scatter_gather_id: String,
    pub total_processes: i64,
    pub finished_processes: i64,
    /// Set once the completion notification for this batch has fired
    #[serde(default)]
    pub gathered: bool,
}

impl BatchCounter {
    pub fn new(batch_id: impl Into<String>, total: i64) -> Self {
        Self {
            scatter_gather_id: batch_id.into(),
            total_processes: total,
            finished_processes: 0,
            gathered: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.finished_processes == self.total_processes
    }

    pub fn remaining(&self) -> i64 {
        self.total_processes - self.finished_processes
    }
}

/// State row of one job inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub scatter_gather_id: String,
    pub process_id: String,
    pub status: JobStatus,
    /// Set once the job's completion has been added to the batch counter
    #[serde(default)]
    pub counted: bool,
}

impl JobState {
    pub fn started(batch_id: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            scatter_gather_id: batch_id.into(),
            process_id: process_id.into(),
            status: JobStatus::Started,
            counted: false,
        }
    }
}

/// Result of [`StateStore::count_completions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCount {
    /// Counter row after the add
    pub counter: BatchCounter,
    /// Jobs counted by this call; ids already counted or not finished are left out
    pub counted: Vec<String>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the aggregate row with `finished = 0`. Fails if the batch exists.
    async fn create_batch(&self, batch_id: &str, total: i64) -> Result<BatchCounter>;

    async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchCounter>>;

    /// Count the completions of `process_ids`, each job at most once.
    ///
    /// Jobs that are `finished` and not yet counted are flagged as counted
    /// and the finished count grows by their number, in one atomic step. An
    /// add that would push `finished` past `total` is rejected with
    /// [`HarvestError::CounterOverflow`] and changes nothing.
    async fn count_completions(&self, batch_id: &str, process_ids: &[String]) -> Result<CompletionCount>;

    /// Flag the batch as gathered. Returns `true` only for the call that
    /// actually set the flag on a complete batch.
    async fn mark_gathered(&self, batch_id: &str) -> Result<bool>;

    /// Insert a job state unless a row with the same key exists. Returns
    /// whether a row was inserted.
    async fn put_job_state(&self, state: &JobState) -> Result<bool>;

    /// Move a job from `from` to `to`. Returns `false` when the row is
    /// missing or not currently in `from`.
    async fn transition_job(
        &self,
        batch_id: &str,
        process_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool>;

    async fn get_job_state(&self, batch_id: &str, process_id: &str) -> Result<Option<JobState>>;

    async fn list_job_states(&self, batch_id: &str) -> Result<Vec<JobState>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_wire_names() {
        assert_eq!(serde_json::to_string(&JobStatus::Finished).unwrap(), "\"finished\"");
        assert_eq!("started".parse::<JobStatus>().unwrap(), JobStatus::Started);
        assert!("pending".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_counter_completion() {
        let mut counter = BatchCounter::new("b", 2);
        assert!(!counter.is_complete());
        counter.finished_processes = 2;
        assert!(counter.is_complete());
        assert_eq!(counter.remaining(), 0);
        assert!(BatchCounter::new("empty", 0).is_complete());
    }
}
