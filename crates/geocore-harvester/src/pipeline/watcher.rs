//! Gather stage
//!
//! Fires the batch-complete notification exactly once per batch. An
//! in-process set filters repeats cheaply; the state store's conditional
//! "mark gathered" update decides across processes.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::state::{BatchCounter, StateStore};

/// Reaction to a completed batch
#[async_trait]
pub trait BatchCompletionHandler: Send + Sync {
    async fn on_batch_complete(&self, batch: &BatchCounter) -> Result<()>;
}

/// Logs the completion and does nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCompletionHandler;

#[async_trait]
impl BatchCompletionHandler for LoggingCompletionHandler {
    async fn on_batch_complete(&self, batch: &BatchCounter) -> Result<()> {
        info!(
            action = "batch_finished",
            batch_id = %batch.scatter_gather_id,
            total = batch.total_processes,
            "Batch finished"
        );
        Ok(())
    }
}

pub struct BatchWatcher {
    state: Arc<dyn StateStore>,
    handler: Arc<dyn BatchCompletionHandler>,
    fired: Mutex<HashSet<String>>,
}

impl BatchWatcher {
    pub fn new(state: Arc<dyn StateStore>, handler: Arc<dyn BatchCompletionHandler>) -> Self {
        Self {
            state,
            handler,
            fired: Mutex::new(HashSet::new()),
        }
    }

    pub fn logging(state: Arc<dyn StateStore>) -> Self {
        Self::new(state, Arc::new(LoggingCompletionHandler))
    }

    /// React to a counter change. Returns `true` when this call fired the
    /// completion handler.
    pub async fn observe(&self, counter: &BatchCounter) -> Result<bool> {
        if !counter.is_complete() {
            return Ok(false);
        }
        let batch_id = &counter.scatter_gather_id;
        if self.fired.lock().await.contains(batch_id) {
            return Ok(false);
        }

        let claimed = self.state.mark_gathered(batch_id).await?;
        self.fired.lock().await.insert(batch_id.clone());
        if !claimed {
            debug!(action = "batch_already_gathered", batch_id = %batch_id, "Batch was already gathered");
            return Ok(false);
        }

        if let Err(e) = self.handler.on_batch_complete(counter).await {
            error!(action = "batch_handler_failed", batch_id = %batch_id, error = %e, "Completion handler failed");
            return Err(e);
        }
        Ok(true)
    }

    /// Load the batch counter and observe it
    pub async fn check(&self, batch_id: &str) -> Result<bool> {
        let counter = self
            .state
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| HarvestError::State(format!("batch {} not found", batch_id)))?;
        self.observe(&counter).await
    }
}
