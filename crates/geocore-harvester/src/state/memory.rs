use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{BatchCounter, CompletionCount, JobState, JobStatus, StateStore};

#[derive(Default)]
struct Tables {
    batches: HashMap<String, BatchCounter>,
    jobs: HashMap<String, BTreeMap<String, JobState>>,
}

/// Process-local [`StateStore`]; one lock serializes every mutation
#[derive(Default)]
pub struct InMemoryStateStore {
    tables: Mutex<Tables>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_batch(&self, batch_id: &str, total: i64) -> Result<BatchCounter> {
        if total < 0 {
            return Err(HarvestError::State(format!(
                "batch {} cannot have a negative total",
                batch_id
            )));
        }
        let mut tables = self.tables.lock().await;
        if tables.batches.contains_key(batch_id) {
            return Err(HarvestError::State(format!("batch {} already exists", batch_id)));
        }
        let counter = BatchCounter::new(batch_id, total);
        tables.batches.insert(batch_id.to_string(), counter.clone());
        Ok(counter)
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchCounter>> {
        Ok(self.tables.lock().await.batches.get(batch_id).cloned())
    }

    async fn count_completions(&self, batch_id: &str, process_ids: &[String]) -> Result<CompletionCount> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let counter = tables
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| HarvestError::State(format!("batch {} not found", batch_id)))?;

        let mut counted: Vec<String> = Vec::new();
        if let Some(jobs) = tables.jobs.get(batch_id) {
            for id in process_ids {
                let eligible = jobs
                    .get(id)
                    .is_some_and(|job| job.status == JobStatus::Finished && !job.counted);
                if eligible && !counted.contains(id) {
                    counted.push(id.clone());
                }
            }
        }

        let delta = counted.len() as i64;
        if counter.finished_processes + delta > counter.total_processes {
            return Err(HarvestError::CounterOverflow {
                batch_id: batch_id.to_string(),
                finished: counter.finished_processes,
                delta,
                total: counter.total_processes,
            });
        }
        counter.finished_processes += delta;
        let counter = counter.clone();

        if let Some(jobs) = tables.jobs.get_mut(batch_id) {
            for id in &counted {
                if let Some(job) = jobs.get_mut(id) {
                    job.counted = true;
                }
            }
        }
        Ok(CompletionCount { counter, counted })
    }

    async fn mark_gathered(&self, batch_id: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.batches.get_mut(batch_id) {
            Some(counter) if counter.is_complete() && !counter.gathered => {
                counter.gathered = true;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn put_job_state(&self, state: &JobState) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let jobs = tables.jobs.entry(state.scatter_gather_id.clone()).or_default();
        if jobs.contains_key(&state.process_id) {
            return Ok(false);
        }
        jobs.insert(state.process_id.clone(), state.clone());
        Ok(true)
    }

    async fn transition_job(
        &self,
        batch_id: &str,
        process_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.jobs.get_mut(batch_id).and_then(|jobs| jobs.get_mut(process_id)) {
            Some(job) if job.status == from => {
                job.status = to;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn get_job_state(&self, batch_id: &str, process_id: &str) -> Result<Option<JobState>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .jobs
            .get(batch_id)
            .and_then(|jobs| jobs.get(process_id))
            .cloned())
    }

    async fn list_job_states(&self, batch_id: &str) -> Result<Vec<JobState>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .jobs
            .get(batch_id)
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default())
    }
}
