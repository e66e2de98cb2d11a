//! Scatter stage
//!
//! Registers a batch and fans out one job message per discovered page. The
//! batch row always exists before the first message is enqueued, so a
//! completion can never reference an unknown batch.

use geocore_common::{HarvestError, Result};
use std::sync::Arc;
use tracing::{error, info};

use super::types::{
    decode_page_list, job_id, new_batch_id, page_list_key, ItemState, JobMessage, PageDescriptor,
};
use crate::queue::JobQueue;
use crate::state::{JobState, StateStore};
use crate::storage::ObjectStore;

/// Outcome of one fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub batch_id: String,
    pub total_jobs: usize,
    pub enqueued: usize,
    /// Job ids whose state or message could not be written. Their state
    /// stays `started` and shows up in the stuck-job report.
    pub failed: Vec<String>,
}

pub struct JobDispatcher {
    state: Arc<dyn StateStore>,
    jobs: Arc<dyn JobQueue>,
}

impl JobDispatcher {
    pub fn new(state: Arc<dyn StateStore>, jobs: Arc<dyn JobQueue>) -> Self {
        Self { state, jobs }
    }

    /// Fan out `pages` under a fresh batch id
    pub async fn dispatch(&self, pages: &[PageDescriptor]) -> Result<DispatchReport> {
        self.dispatch_batch(&new_batch_id(), pages).await
    }

    /// Fan out `pages` under `batch_id`. Only a failure to create the batch
    /// row is returned as an error; per-job failures are reported.
    pub async fn dispatch_batch(
        &self,
        batch_id: &str,
        pages: &[PageDescriptor],
    ) -> Result<DispatchReport> {
        self.state.create_batch(batch_id, pages.len() as i64).await?;
        info!(
            action = "batch_created",
            batch_id = %batch_id,
            total = pages.len(),
            "Created batch"
        );

        let mut report = DispatchReport {
            batch_id: batch_id.to_string(),
            total_jobs: pages.len(),
            enqueued: 0,
            failed: Vec::new(),
        };

        for (index, page) in pages.iter().enumerate() {
            let state = JobState::started(batch_id, job_id(index, &page.source_page_url));
            match self.enqueue_job(index, page, &state).await {
                Ok(()) => report.enqueued += 1,
                Err(e) => {
                    error!(
                        action = "enqueue_failed",
                        batch_id = %batch_id,
                        job_id = %state.process_id,
                        error = %e,
                        "Failed to dispatch job"
                    );
                    report.failed.push(state.process_id);
                },
            }
        }

        info!(
            action = "batch_dispatched",
            batch_id = %batch_id,
            enqueued = report.enqueued,
            failed = report.failed.len(),
            "Dispatched batch"
        );
        Ok(report)
    }

    async fn enqueue_job(&self, index: usize, page: &PageDescriptor, state: &JobState) -> Result<()> {
        self.state.put_job_state(state).await?;
        let message = JobMessage {
            item_api: page.source_page_url.clone(),
            index,
            item_state: ItemState::from(state),
        };
        self.jobs.enqueue(message.to_bytes()?).await
    }

    /// Fan out the page list discovery stored for `collection_id`
    pub async fn dispatch_from_store(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        collection_id: &str,
    ) -> Result<DispatchReport> {
        let key = page_list_key(collection_id);
        let data = store.get(bucket, &key).await?.ok_or_else(|| {
            HarvestError::Storage(format!("page list {}/{} not found", bucket, key))
        })?;
        let pages = decode_page_list(&data)?;
        self.dispatch(&pages).await
    }
}
