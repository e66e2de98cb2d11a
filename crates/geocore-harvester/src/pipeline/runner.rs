//! Wiring of the pipeline stages
//!
//! [`Harvester`] owns the adapters and hands them to each stage. The CLI
//! runs the stages one at a time against Postgres, or all of them in one
//! process with [`Harvester::run`].

use geocore_common::{HarvestError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::aggregator::{BatchProgress, ProgressAggregator};
use super::catalog::{harvest_catalog, CatalogSnapshot};
use super::discovery::{discover, DiscoveryOutcome};
use super::dispatcher::{DispatchReport, JobDispatcher};
use super::types::{encode_page_list, page_list_key};
use super::watcher::BatchWatcher;
use super::worker::{WorkSummary, Worker, WorkerSettings};
use crate::config::HarvesterConfig;
use crate::geocore::{ParentContext, TranslationConfig};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::queue::{InMemoryJobQueue, JobQueue, PgJobQueue, COMPLETIONS_QUEUE, JOBS_QUEUE};
use crate::state::{InMemoryStateStore, PgStateStore, StateStore};
use crate::storage::{self, ObjectStore};

/// Pause between passes while another process still holds deliveries
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Knobs of a harvest that are not translation input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub api_root: String,
    pub page_size: u32,
    pub max_pages: Option<usize>,
    pub worker_concurrency: usize,
    pub aggregator_batch_size: usize,
    pub processed_bucket: String,
    pub item_link_bucket: String,
    pub run_log_bucket: String,
}

impl From<&HarvesterConfig> for RunSettings {
    fn from(config: &HarvesterConfig) -> Self {
        Self {
            api_root: config.api_root.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages,
            worker_concurrency: config.worker_concurrency,
            aggregator_batch_size: config.aggregator_batch_size,
            processed_bucket: config.processed_data_bucket.clone(),
            item_link_bucket: config.item_link_bucket.clone(),
            run_log_bucket: config.run_log_bucket.clone(),
        }
    }
}

/// Result of the discovery stage
#[derive(Debug)]
pub struct DiscoveryRun {
    /// `None` when the landing page or collection list was unreachable
    pub snapshot: Option<CatalogSnapshot>,
    pub outcome: DiscoveryOutcome,
}

/// Result of [`Harvester::run`]
#[derive(Debug)]
pub struct RunSummary {
    pub pages: usize,
    pub discovery_error: Option<HarvestError>,
    pub dispatch: DispatchReport,
    pub work: WorkSummary,
    pub progress: BatchProgress,
    /// Whether the completion handler fired during this run
    pub fired: bool,
}

pub struct Harvester {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn ObjectStore>,
    state: Arc<dyn StateStore>,
    jobs: Arc<dyn JobQueue>,
    completions: Arc<dyn JobQueue>,
    config: Arc<TranslationConfig>,
    settings: RunSettings,
}

impl Harvester {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn ObjectStore>,
        state: Arc<dyn StateStore>,
        jobs: Arc<dyn JobQueue>,
        completions: Arc<dyn JobQueue>,
        config: TranslationConfig,
        settings: RunSettings,
    ) -> Self {
        Self {
            http,
            store,
            state,
            jobs,
            completions,
            config: Arc::new(config),
            settings,
        }
    }

    /// Build every adapter from configuration. Without a database the state
    /// store and queues live in memory and only `run` is meaningful.
    pub async fn connect(config: &HarvesterConfig) -> Result<Self> {
        let http = Arc::new(ReqwestHttpClient::new(Duration::from_secs(config.http_timeout_secs))?);
        let store = storage::connect(&config.storage).await?;

        let (state, jobs, completions): (Arc<dyn StateStore>, Arc<dyn JobQueue>, Arc<dyn JobQueue>) =
            match &config.database_url {
                Some(url) => {
                    let pool = crate::db::create_pool(url, config.database_max_connections).await?;
                    (
                        Arc::new(PgStateStore::new(pool.clone())),
                        Arc::new(
                            PgJobQueue::new(pool.clone(), JOBS_QUEUE)
                                .with_max_attempts(config.max_delivery_attempts),
                        ),
                        Arc::new(
                            PgJobQueue::new(pool, COMPLETIONS_QUEUE)
                                .with_max_attempts(config.max_delivery_attempts),
                        ),
                    )
                },
                None => {
                    warn!("DATABASE_URL not set, batch state and queues are kept in memory");
                    (
                        Arc::new(InMemoryStateStore::new()),
                        Arc::new(InMemoryJobQueue::with_max_attempts(
                            JOBS_QUEUE,
                            config.max_delivery_attempts,
                        )),
                        Arc::new(InMemoryJobQueue::with_max_attempts(
                            COMPLETIONS_QUEUE,
                            config.max_delivery_attempts,
                        )),
                    )
                },
            };

        Ok(Self::new(
            http,
            store,
            state,
            jobs,
            completions,
            config.translation_config()?,
            RunSettings::from(config),
        ))
    }

    pub fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher::new(self.state.clone(), self.jobs.clone())
    }

    pub fn worker(&self, parents: Option<ParentContext>) -> Worker {
        let worker = Worker::new(
            self.http.clone(),
            self.store.clone(),
            self.state.clone(),
            self.completions.clone(),
            self.config.clone(),
            WorkerSettings {
                api_root: self.settings.api_root.clone(),
                processed_bucket: self.settings.processed_bucket.clone(),
                run_log_bucket: self.settings.run_log_bucket.clone(),
            },
        );
        match parents {
            Some(parents) => worker.with_parent_context(parents),
            None => worker,
        }
    }

    pub fn aggregator(&self) -> ProgressAggregator {
        ProgressAggregator::new(self.state.clone(), self.completions.clone())
            .with_batch_size(self.settings.aggregator_batch_size)
    }

    pub fn watcher(&self) -> BatchWatcher {
        BatchWatcher::logging(self.state.clone())
    }

    /// Harvest the root catalog and collection records, discover the item
    /// pages and persist the page list
    pub async fn discover(&self) -> Result<DiscoveryRun> {
        let collection = &self.config.eo_collection;
        let snapshot = match CatalogSnapshot::fetch(self.http.as_ref(), &self.settings.api_root).await {
            Ok(snapshot) => {
                if let Err(e) = harvest_catalog(
                    &snapshot,
                    self.store.as_ref(),
                    &self.settings.processed_bucket,
                    &self.config,
                )
                .await
                {
                    warn!(action = "catalog_upload_failed", error = %e, "Failed to store catalog records");
                }
                Some(snapshot)
            },
            Err(e) => {
                warn!(action = "catalog_unavailable", error = %e, "Could not load the root catalog");
                None
            },
        };

        let outcome = discover(
            self.http.as_ref(),
            &self.settings.api_root,
            collection,
            self.settings.page_size,
            self.settings.max_pages,
        )
        .await;

        let key = page_list_key(collection);
        self.store
            .put(&self.settings.item_link_bucket, &key, encode_page_list(&outcome.pages)?)
            .await?;
        info!(
            action = "page_list_stored",
            bucket = %self.settings.item_link_bucket,
            key = %key,
            pages = outcome.pages.len(),
            "Stored page list"
        );

        Ok(DiscoveryRun { snapshot, outcome })
    }

    /// Fan out the stored page list
    pub async fn dispatch(&self) -> Result<DispatchReport> {
        self.dispatcher()
            .dispatch_from_store(
                self.store.as_ref(),
                &self.settings.item_link_bucket,
                &self.config.eo_collection,
            )
            .await
    }

    /// Process every ready job
    pub async fn work(&self) -> Result<WorkSummary> {
        let worker = Arc::new(self.worker(None));
        worker.drain(self.jobs.clone(), self.settings.worker_concurrency).await
    }

    /// Apply every pending completion signal. Returns the number of batches
    /// that completed.
    pub async fn aggregate(&self) -> Result<usize> {
        self.aggregate_with(&self.aggregator(), &self.watcher()).await
    }

    async fn aggregate_with(
        &self,
        aggregator: &ProgressAggregator,
        watcher: &BatchWatcher,
    ) -> Result<usize> {
        let mut fired = 0;
        loop {
            let report = aggregator.poll().await?;
            if report.received == 0 {
                break;
            }
            for counter in &report.updated {
                if watcher.observe(counter).await? {
                    fired += 1;
                }
            }
        }
        Ok(fired)
    }

    pub async fn status(&self, batch_id: &str) -> Result<BatchProgress> {
        self.aggregator().progress(batch_id).await
    }

    /// Every stage in this process, until the batch's queues are drained
    pub async fn run(&self) -> Result<RunSummary> {
        let discovery = self.discover().await?;
        let dispatch = self.dispatcher().dispatch(&discovery.outcome.pages).await?;
        let batch_id = dispatch.batch_id.clone();

        let aggregator = self.aggregator();
        let watcher = self.watcher();
        // an empty batch is complete as soon as it exists
        let mut fired = watcher.check(&batch_id).await?;

        let parents = discovery
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.parent_context(&self.config));
        let worker = Arc::new(self.worker(parents));
        let mut work = WorkSummary::default();

        loop {
            work += worker.drain(self.jobs.clone(), self.settings.worker_concurrency).await?;
            fired |= self.aggregate_with(&aggregator, &watcher).await? > 0;

            let jobs = self.jobs.stats().await?;
            let completions = self.completions.stats().await?;
            if jobs.is_drained() && completions.is_drained() {
                break;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }

        let progress = aggregator.progress(&batch_id).await?;
        if !progress.is_complete() {
            warn!(
                action = "batch_incomplete",
                batch_id = %batch_id,
                finished = progress.finished,
                total = progress.total,
                stuck = progress.stuck_jobs.len(),
                "Batch did not complete"
            );
        }

        Ok(RunSummary {
            pages: discovery.outcome.pages.len(),
            discovery_error: discovery.outcome.error,
            dispatch,
            work,
            progress,
            fired,
        })
    }
}
