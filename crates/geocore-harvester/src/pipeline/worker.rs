//! Processor stage
//!
//! A worker takes one job message, fetches the page it names, translates
//! and stores every item, then moves the job's state to `finished` and
//! emits a completion signal. A redelivered job whose completion has not
//! been counted yet sends its signal again; counting is once per job, so
//! the extra signal never counts twice.

use geocore_common::{HarvestError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::catalog::resolve_parent_context;
use super::types::{item_key, manifest_key, CompletionSignal, JobMessage};
use crate::geocore::{translate_item, ParentContext, TranslationConfig};
use crate::http::HttpClient;
use crate::queue::{Delivery, JobQueue, ReleaseOutcome};
use crate::state::{JobStatus, StateStore};
use crate::stac::ItemPage;
use crate::storage::ObjectStore;

/// Where a worker reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub api_root: String,
    pub processed_bucket: String,
    pub run_log_bucket: String,
}

/// Result of one processed job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub batch_id: String,
    pub job_id: String,
    pub stored: usize,
    pub skipped: usize,
    pub pruned: usize,
    /// Whether this delivery moved the job to `finished`
    pub finished_now: bool,
    /// Whether this delivery emitted a completion signal
    pub signalled: bool,
}

/// What happened to a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked(JobReport),
    Released(ReleaseOutcome),
}

/// Totals of [`Worker::drain`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkSummary {
    pub acked: usize,
    pub released: usize,
    pub dead_lettered: usize,
}

impl std::ops::AddAssign for WorkSummary {
    fn add_assign(&mut self, other: Self) {
        self.acked += other.acked;
        self.released += other.released;
        self.dead_lettered += other.dead_lettered;
    }
}

pub struct Worker {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn ObjectStore>,
    state: Arc<dyn StateStore>,
    completions: Arc<dyn JobQueue>,
    config: Arc<TranslationConfig>,
    settings: WorkerSettings,
    parents: OnceCell<ParentContext>,
}

impl Worker {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn ObjectStore>,
        state: Arc<dyn StateStore>,
        completions: Arc<dyn JobQueue>,
        config: Arc<TranslationConfig>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            http,
            store,
            state,
            completions,
            config,
            settings,
            parents: OnceCell::new(),
        }
    }

    /// Use an already resolved parent context instead of fetching it
    pub fn with_parent_context(mut self, parents: ParentContext) -> Self {
        self.parents = OnceCell::new_with(Some(parents));
        self
    }

    async fn parents(&self) -> Result<&ParentContext> {
        self.parents
            .get_or_try_init(|| {
                resolve_parent_context(self.http.as_ref(), &self.settings.api_root, &self.config)
            })
            .await
    }

    /// Handle one delivery end to end: ack it when the job is processed,
    /// release it for redelivery otherwise
    pub async fn handle_delivery(
        &self,
        jobs: &dyn JobQueue,
        delivery: &Delivery,
    ) -> Result<DeliveryOutcome> {
        let processed = match JobMessage::from_slice(&delivery.payload) {
            Ok(message) => self.process(&message).await,
            Err(e) => Err(e),
        };

        match processed {
            Ok(report) => {
                jobs.ack(delivery).await?;
                Ok(DeliveryOutcome::Acked(report))
            },
            Err(e) => {
                error!(
                    action = "job_failed",
                    delivery_id = delivery.id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Job failed, releasing for redelivery"
                );
                let outcome = jobs.release(delivery, &e.to_string()).await?;
                Ok(DeliveryOutcome::Released(outcome))
            },
        }
    }

    /// Process one job message.
    ///
    /// Page and storage failures are returned and leave the job `started`.
    /// Records that fail to validate or translate are skipped.
    pub async fn process(&self, message: &JobMessage) -> Result<JobReport> {
        let batch_id = message.batch_id();
        let job_id = message.job_id();
        let mut report = JobReport {
            batch_id: batch_id.to_string(),
            job_id: job_id.to_string(),
            ..JobReport::default()
        };

        let parents = self.parents().await?;
        let page = self.fetch_page(&message.item_api).await?;
        let source = &self.config.source;
        let mut written = Vec::new();

        for parsed in page.items() {
            let item = match parsed {
                Ok(item) => item,
                Err(e) => {
                    warn!(action = "item_skipped", job_id = %job_id, error = %e, "Skipping invalid item");
                    report.skipped += 1;
                    continue;
                },
            };
            let record = match translate_item(&item, &self.config, parents) {
                Ok(record) => record,
                Err(e) => {
                    warn!(action = "translate_failed", id = %item.id, error = %e, "Skipping item");
                    report.skipped += 1;
                    continue;
                },
            };
            let collection_id = item.collection.as_deref().unwrap_or(&self.config.eo_collection);
            let key = item_key(source, collection_id, &item.id);
            let body = record.into_document().to_bytes()?;
            self.store.put(&self.settings.processed_bucket, &key, body).await?;
            debug!(action = "item_uploaded", job_id = %job_id, key = %key, "Uploaded item");
            written.push(key);
        }
        report.stored = written.len();
        info!(
            action = "page_translated",
            batch_id = %batch_id,
            job_id = %job_id,
            stored = report.stored,
            skipped = report.skipped,
            "Translated page"
        );

        report.pruned = self.write_manifest(message.index, &written).await?;

        report.finished_now = self
            .state
            .transition_job(batch_id, job_id, JobStatus::Started, JobStatus::Finished)
            .await?;
        report.signalled = report.finished_now || self.needs_resend(batch_id, job_id).await?;

        if report.signalled {
            let signal = CompletionSignal {
                scatter_gather_id: batch_id.to_string(),
                process_id: job_id.to_string(),
            };
            if let Err(e) = self.completions.enqueue(signal.to_bytes()?).await {
                // the job stays uncounted; its redelivery sends the signal again
                error!(
                    action = "completion_lost",
                    batch_id = %batch_id,
                    job_id = %job_id,
                    error = %e,
                    "Failed to emit completion signal"
                );
                return Err(e);
            }
            info!(
                action = "job_finished",
                batch_id = %batch_id,
                job_id = %job_id,
                resent = !report.finished_now,
                "Job finished"
            );
        }

        Ok(report)
    }

    /// A job finished by an earlier delivery needs its signal again until
    /// the aggregator has counted it
    async fn needs_resend(&self, batch_id: &str, job_id: &str) -> Result<bool> {
        match self.state.get_job_state(batch_id, job_id).await? {
            Some(job) if job.status == JobStatus::Finished => {
                if job.counted {
                    info!(
                        action = "job_already_counted",
                        batch_id = %batch_id,
                        job_id = %job_id,
                        "Job was finished and counted by an earlier delivery"
                    );
                }
                Ok(!job.counted)
            },
            _ => {
                warn!(
                    action = "job_state_missing",
                    batch_id = %batch_id,
                    job_id = %job_id,
                    "Job has no state row, not signalling"
                );
                Ok(false)
            },
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<ItemPage> {
        let response = self.http.get(url).await?;
        if !response.is_success() {
            return Err(HarvestError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(ItemPage::from_slice(&response.body)?)
    }

    /// Replace the run manifest of page `index` and delete the outputs the
    /// previous run listed but this one did not write
    async fn write_manifest(&self, index: usize, written: &[String]) -> Result<usize> {
        let bucket = &self.settings.run_log_bucket;
        let key = manifest_key(&self.config.source, &self.config.eo_collection, index);

        let previous: BTreeSet<String> = match self.store.get(bucket, &key).await {
            Ok(Some(data)) => String::from_utf8_lossy(&data)
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(action = "manifest_unreadable", key = %key, error = %e, "Ignoring previous run manifest");
                BTreeSet::new()
            },
        };

        self.store
            .put(bucket, &key, written.join("\n").into_bytes())
            .await?;

        let current: BTreeSet<&str> = written.iter().map(String::as_str).collect();
        let mut pruned = 0;
        for stale in previous.iter().filter(|k| !current.contains(k.as_str())) {
            match self.store.delete(&self.settings.processed_bucket, stale).await {
                Ok(()) => {
                    pruned += 1;
                    info!(action = "stale_output_deleted", key = %stale, "Deleted stale output");
                },
                Err(e) => warn!(action = "stale_output_kept", key = %stale, error = %e, "Failed to delete stale output"),
            }
        }
        Ok(pruned)
    }

    /// Process deliveries until the queue has nothing ready, running at
    /// most `concurrency` jobs at once
    pub async fn drain(self: &Arc<Self>, jobs: Arc<dyn JobQueue>, concurrency: usize) -> Result<WorkSummary> {
        let mut summary = WorkSummary::default();
        loop {
            let deliveries = jobs.receive(concurrency.max(1)).await?;
            if deliveries.is_empty() {
                break;
            }

            let mut tasks = JoinSet::new();
            for delivery in deliveries {
                let worker = Arc::clone(self);
                let jobs = Arc::clone(&jobs);
                tasks.spawn(async move { worker.handle_delivery(jobs.as_ref(), &delivery).await });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(DeliveryOutcome::Acked(_))) => summary.acked += 1,
                    Ok(Ok(DeliveryOutcome::Released(ReleaseOutcome::Requeued))) => summary.released += 1,
                    Ok(Ok(DeliveryOutcome::Released(ReleaseOutcome::DeadLettered))) => {
                        summary.dead_lettered += 1
                    },
                    Ok(Err(e)) => error!(action = "delivery_error", error = %e, "Queue operation failed"),
                    Err(e) => error!(action = "worker_panic", error = %e, "Worker task failed"),
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geocore::CollectionContext;
    use crate::http::testing::CannedHttpClient;
    use crate::pipeline::aggregator::ProgressAggregator;
    use crate::pipeline::types::{job_id, ItemState};
    use crate::queue::{InMemoryJobQueue, QueueStats};
    use crate::state::{InMemoryStateStore, JobState};
    use crate::storage::{InMemoryObjectStore, PutReceipt};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    const PAGE: &str = "https://stac.example/collections/rcm-ard/items?limit=2";

    fn feature(id: &str) -> Value {
        json!({
            "type": "Feature",
            "id": id,
            "collection": "rcm-ard",
            "bbox": [-75.0, 45.0, -74.0, 46.0],
            "properties": {"datetime": "2023-05-01T10:20:30.123Z"}
        })
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            api_root: "https://stac.example".into(),
            processed_bucket: "processed".into(),
            run_log_bucket: "runs".into(),
        }
    }

    fn config() -> Arc<TranslationConfig> {
        Arc::new(TranslationConfig::new("eodms", "ccmeo-eodms", "EODMS / EODMS", "rcm-ard"))
    }

    fn parents() -> ParentContext {
        ParentContext::new("eodms").with_collection(CollectionContext::unlisted("rcm-ard"))
    }

    fn message(batch_id: &str) -> JobMessage {
        JobMessage {
            item_api: PAGE.into(),
            index: 0,
            item_state: ItemState::from(&JobState::started(batch_id, job_id(0, PAGE))),
        }
    }

    struct Harness {
        store: Arc<InMemoryObjectStore>,
        state: Arc<InMemoryStateStore>,
        completions: Arc<InMemoryJobQueue>,
    }

    impl Harness {
        async fn new(batch_id: &str) -> Self {
            let state = Arc::new(InMemoryStateStore::new());
            state.create_batch(batch_id, 1).await.unwrap();
            state
                .put_job_state(&JobState::started(batch_id, job_id(0, PAGE)))
                .await
                .unwrap();
            Self {
                store: Arc::new(InMemoryObjectStore::new()),
                state,
                completions: Arc::new(InMemoryJobQueue::new("completions")),
            }
        }

        fn worker(&self, http: CannedHttpClient) -> Worker {
            Worker::new(
                Arc::new(http),
                self.store.clone(),
                self.state.clone(),
                self.completions.clone(),
                config(),
                settings(),
            )
            .with_parent_context(parents())
        }
    }

    #[tokio::test]
    async fn test_process_stores_items_and_signals_once() {
        let harness = Harness::new("b1").await;
        let http = CannedHttpClient::new().json(
            PAGE,
            json!({"features": [feature("A_1"), {"type": "Feature", "id": "broken"}, feature("B_2")]}),
        );
        let worker = harness.worker(http);

        let report = worker.process(&message("b1")).await.unwrap();
        assert_eq!((report.stored, report.skipped, report.finished_now), (2, 1, true));
        assert!(report.signalled);
        assert_eq!(
            harness.store.keys("processed").await,
            vec!["eodms-rcm-ard-A_1.geojson", "eodms-rcm-ard-B_2.geojson"]
        );
        let manifest = harness.store.get("runs", "lastRun_eodms_rcm-ard_0.txt").await.unwrap().unwrap();
        assert_eq!(manifest, b"eodms-rcm-ard-A_1.geojson\neodms-rcm-ard-B_2.geojson".to_vec());

        let state = harness.state.get_job_state("b1", &job_id(0, PAGE)).await.unwrap().unwrap();
        assert_eq!(state.status, JobStatus::Finished);

        // before the completion is counted a redelivery signals again
        let again = worker.process(&message("b1")).await.unwrap();
        assert!(!again.finished_now);
        assert!(again.signalled);
        assert_eq!(harness.completions.stats().await.unwrap().ready, 2);

        let aggregator = ProgressAggregator::new(harness.state.clone(), harness.completions.clone());
        let report = aggregator.poll().await.unwrap();
        assert_eq!(report.updated[0].finished_processes, 1);

        // once counted, a redelivery stays quiet
        let late = worker.process(&message("b1")).await.unwrap();
        assert!(!late.signalled);
        assert!(harness.completions.stats().await.unwrap().is_drained());
    }

    /// Completion queue whose enqueue fails while `down` is set
    struct FlakyCompletions {
        inner: InMemoryJobQueue,
        down: AtomicBool,
    }

    #[async_trait]
    impl JobQueue for FlakyCompletions {
        async fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(HarvestError::Queue("completions unavailable".into()));
            }
            self.inner.enqueue(payload).await
        }

        async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
            self.inner.receive(max).await
        }

        async fn ack(&self, delivery: &Delivery) -> Result<()> {
            self.inner.ack(delivery).await
        }

        async fn release(&self, delivery: &Delivery, reason: &str) -> Result<ReleaseOutcome> {
            self.inner.release(delivery, reason).await
        }

        async fn stats(&self) -> Result<QueueStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_lost_signal_is_reported_and_resent() {
        let harness = Harness::new("b6").await;
        let completions = Arc::new(FlakyCompletions {
            inner: InMemoryJobQueue::new("completions"),
            down: AtomicBool::new(true),
        });
        let worker = Worker::new(
            Arc::new(CannedHttpClient::new().json(PAGE, json!({"features": [feature("A_1")]}))),
            harness.store.clone(),
            harness.state.clone(),
            completions.clone(),
            config(),
            settings(),
        )
        .with_parent_context(parents());
        let aggregator = ProgressAggregator::new(harness.state.clone(), completions.clone());

        let err = worker.process(&message("b6")).await.unwrap_err();
        assert_eq!(err.kind(), "queue");

        let progress = aggregator.progress("b6").await.unwrap();
        assert_eq!(progress.finished, 0);
        assert_eq!(progress.stuck_jobs, vec![job_id(0, PAGE)]);

        completions.down.store(false, Ordering::SeqCst);
        let report = worker.process(&message("b6")).await.unwrap();
        assert!(!report.finished_now);
        assert!(report.signalled);

        aggregator.poll().await.unwrap();
        let progress = aggregator.progress("b6").await.unwrap();
        assert!(progress.is_complete());
        assert!(progress.stuck_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_page_failure_releases_delivery() {
        let harness = Harness::new("b2").await;
        let worker = harness.worker(CannedHttpClient::new().status(PAGE, 503));
        let jobs = InMemoryJobQueue::new("jobs");
        jobs.enqueue(message("b2").to_bytes().unwrap()).await.unwrap();

        let delivery = jobs.receive(1).await.unwrap().remove(0);
        let outcome = worker.handle_delivery(&jobs, &delivery).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Released(ReleaseOutcome::Requeued));

        let state = harness.state.get_job_state("b2", &job_id(0, PAGE)).await.unwrap().unwrap();
        assert_eq!(state.status, JobStatus::Started);
        assert_eq!(harness.completions.stats().await.unwrap().ready, 0);
        assert_eq!(jobs.stats().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_manifest_prunes_stale_outputs() {
        let harness = Harness::new("b3").await;
        harness
            .store
            .put("runs", "lastRun_eodms_rcm-ard_0.txt", b"eodms-rcm-ard-OLD.geojson\neodms-rcm-ard-A_1.geojson".to_vec())
            .await
            .unwrap();
        harness.store.put("processed", "eodms-rcm-ard-OLD.geojson", b"{}".to_vec()).await.unwrap();

        let http = CannedHttpClient::new().json(PAGE, json!({"features": [feature("A_1")]}));
        let report = harness.worker(http).process(&message("b3")).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(harness.store.keys("processed").await, vec!["eodms-rcm-ard-A_1.geojson"]);
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl ObjectStore for ReadOnlyStore {
        async fn get(&self, _bucket: &str, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn put(&self, bucket: &str, key: &str, _data: Vec<u8>) -> Result<PutReceipt> {
            Err(HarvestError::Storage(format!("{}/{} is read-only", bucket, key)))
        }

        async fn delete(&self, _bucket: &str, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_job_started() {
        let harness = Harness::new("b4").await;
        let worker = Worker::new(
            Arc::new(CannedHttpClient::new().json(PAGE, json!({"features": [feature("A_1")]}))),
            Arc::new(ReadOnlyStore),
            harness.state.clone(),
            harness.completions.clone(),
            config(),
            settings(),
        )
        .with_parent_context(parents());

        let err = worker.process(&message("b4")).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
        let state = harness.state.get_job_state("b4", &job_id(0, PAGE)).await.unwrap().unwrap();
        assert_eq!(state.status, JobStatus::Started);
    }

    #[tokio::test]
    async fn test_drain_dead_letters_after_max_attempts() {
        let harness = Harness::new("b5").await;
        let worker = Arc::new(harness.worker(CannedHttpClient::new().status(PAGE, 500)));
        let jobs = Arc::new(InMemoryJobQueue::with_max_attempts("jobs", 2));
        jobs.enqueue(message("b5").to_bytes().unwrap()).await.unwrap();

        let summary = worker.drain(jobs.clone(), 4).await.unwrap();
        assert_eq!(summary, WorkSummary { acked: 0, released: 1, dead_lettered: 1 });
        assert_eq!(jobs.dead_letters().await.len(), 1);
    }
}
