//! Progress aggregation
//!
//! Completion signals are read in windows, grouped per batch and applied as
//! one atomic count per batch. Each job counts once no matter how often its
//! signal is delivered, so redelivered signals are acked without effect.

use geocore_common::{HarvestError, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::types::CompletionSignal;
use crate::queue::{Delivery, JobQueue};
use crate::state::{BatchCounter, StateStore};

/// Default number of signals read per window.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Result of one aggregation window
#[derive(Debug, Default)]
pub struct AggregationReport {
    pub received: usize,
    /// Counter rows after this window's adds
    pub updated: Vec<BatchCounter>,
    /// Batches whose add was rejected
    pub rejected: Vec<String>,
}

/// Operator view of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: i64,
    pub finished: i64,
    pub gathered: bool,
    /// Jobs whose completion has not been counted, `started` or not
    pub stuck_jobs: Vec<String>,
}

impl BatchProgress {
    pub fn is_complete(&self) -> bool {
        self.finished == self.total
    }
}

pub struct ProgressAggregator {
    state: Arc<dyn StateStore>,
    completions: Arc<dyn JobQueue>,
    batch_size: usize,
}

impl ProgressAggregator {
    pub fn new(state: Arc<dyn StateStore>, completions: Arc<dyn JobQueue>) -> Self {
        Self {
            state,
            completions,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Read one window of signals and apply it.
    ///
    /// Deliveries of a batch are acked once its completions are counted and
    /// released on any state error, overflow included.
    pub async fn poll(&self) -> Result<AggregationReport> {
        let deliveries = self.completions.receive(self.batch_size).await?;
        let mut report = AggregationReport {
            received: deliveries.len(),
            ..AggregationReport::default()
        };
        if deliveries.is_empty() {
            return Ok(report);
        }

        let mut by_batch: BTreeMap<String, (Vec<String>, Vec<&Delivery>)> = BTreeMap::new();
        let mut seen = HashSet::new();
        for delivery in &deliveries {
            match CompletionSignal::from_slice(&delivery.payload) {
                Ok(signal) => {
                    let group = by_batch.entry(signal.scatter_gather_id.clone()).or_default();
                    if seen.insert(signal.clone()) {
                        group.0.push(signal.process_id);
                    } else {
                        debug!(
                            action = "signal_duplicate",
                            batch_id = %signal.scatter_gather_id,
                            "Duplicate signal in window"
                        );
                    }
                    group.1.push(delivery);
                },
                Err(e) => {
                    warn!(action = "signal_invalid", delivery_id = delivery.id, error = %e, "Invalid completion signal");
                    self.completions.release(delivery, &e.to_string()).await?;
                },
            }
        }

        for (batch_id, (process_ids, batch_deliveries)) in by_batch {
            match self.state.count_completions(&batch_id, &process_ids).await {
                Ok(count) => {
                    let ignored = batch_deliveries.len() - count.counted.len();
                    info!(
                        action = "batch_progress",
                        batch_id = %batch_id,
                        added = count.counted.len(),
                        ignored,
                        finished = count.counter.finished_processes,
                        total = count.counter.total_processes,
                        "Applied completions"
                    );
                    self.ack_all(&batch_deliveries).await?;
                    report.updated.push(count.counter);
                },
                Err(e) => {
                    error!(
                        action = "counter_update_failed",
                        batch_id = %batch_id,
                        signals = process_ids.len(),
                        error = %e,
                        "Failed to apply completions"
                    );
                    for delivery in &batch_deliveries {
                        self.completions.release(delivery, &e.to_string()).await?;
                    }
                    report.rejected.push(batch_id);
                },
            }
        }

        Ok(report)
    }

    async fn ack_all(&self, deliveries: &[&Delivery]) -> Result<()> {
        for delivery in deliveries {
            self.completions.ack(delivery).await?;
        }
        Ok(())
    }

    /// Counter plus the jobs that have not finished yet
    pub async fn progress(&self, batch_id: &str) -> Result<BatchProgress> {
        let counter = self
            .state
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| HarvestError::State(format!("batch {} not found", batch_id)))?;
        let stuck_jobs = self
            .state
            .list_job_states(batch_id)
            .await?
            .into_iter()
            .filter(|job| !job.counted)
            .map(|job| job.process_id)
            .collect();

        Ok(BatchProgress {
            batch_id: counter.scatter_gather_id,
            total: counter.total_processes,
            finished: counter.finished_processes,
            gathered: counter.gathered,
            stuck_jobs,
        })
    }
}
