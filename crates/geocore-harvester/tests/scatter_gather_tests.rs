//! End-to-end scatter-gather runs with in-memory adapters
//!
//! A `wiremock` server plays the STAC API; state, queues and object storage
//! live in process memory.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use geocore_harvester::geocore::TranslationConfig;
use geocore_harvester::http::ReqwestHttpClient;
use geocore_harvester::pipeline::{
    BatchCompletionHandler, BatchWatcher, Harvester, JobDispatcher, JobMessage, PageDescriptor,
    ProgressAggregator, RunSettings, Worker, WorkerSettings,
};
use geocore_harvester::queue::{InMemoryJobQueue, JobQueue};
use geocore_harvester::state::{BatchCounter, InMemoryStateStore, JobStatus, StateStore};
use geocore_harvester::storage::{InMemoryObjectStore, ObjectStore, PutReceipt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTION: &str = "rcm-ard";

fn translation() -> TranslationConfig {
    TranslationConfig::new(
        "eodms",
        "ccmeo-eodms",
        "EODMS Datacube API / EODMS Cube de données API",
        COLLECTION,
    )
}

fn feature(id: &str) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "collection": COLLECTION,
        "bbox": [-75.1234, 45.0, -74.0, 46.0],
        "properties": {
            "datetime": "2023-05-01T10:20:30.123Z",
            "sar:polarizations": ["HH", "HV"],
            "sat:orbit_state": "descending"
        },
        "links": [{"rel": "self", "href": format!("https://stac/items/{}", id), "type": "application/geo+json"}]
    })
}

/// Catalog with one collection and `pages` item pages of two features each
async fn stac_server(pages: usize) -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "Catalog",
            "id": "eodms datacube",
            "description": "EODMS STAC API",
            "links": [{"rel": "self", "href": format!("{}/", uri), "type": "application/json"}]
        })))
        .mount(&server)
        .await;
    Mock::given(path("/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [{
                "type": "Collection",
                "id": COLLECTION,
                "title": "RCM ARD",
                "keywords": ["RCM"],
                "extent": {
                    "spatial": {"bbox": [[-141.0, 41.68, -52.62, 83.11]]},
                    "temporal": {"interval": [["2019-06-12T00:00:00.000Z", null]]}
                }
            }]
        })))
        .mount(&server)
        .await;

    for n in 0..pages {
        let route = if n == 0 {
            format!("/collections/{}/items", COLLECTION)
        } else {
            format!("/collections/{}/items/page{}", COLLECTION, n)
        };
        let mut links = Vec::new();
        if n + 1 < pages {
            links.push(json!({
                "rel": "next",
                "href": format!("{}/collections/{}/items/page{}", uri, COLLECTION, n + 1)
            }));
        }
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "features": [feature(&format!("P{}_A", n)), feature(&format!("P{}_B", n))],
                "links": links,
                "context": {"returned": 2, "matched": pages * 2}
            })))
            .mount(&server)
            .await;
    }
    server
}

fn settings(api_root: &str) -> RunSettings {
    RunSettings {
        api_root: api_root.to_string(),
        page_size: 2,
        max_pages: None,
        worker_concurrency: 4,
        aggregator_batch_size: 10,
        processed_bucket: "processed".into(),
        item_link_bucket: "links".into(),
        run_log_bucket: "runs".into(),
    }
}

fn http() -> Arc<ReqwestHttpClient> {
    Arc::new(ReqwestHttpClient::new(Duration::from_secs(5)).unwrap())
}

#[derive(Default)]
struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl BatchCompletionHandler for CountingHandler {
    async fn on_batch_complete(&self, _batch: &BatchCounter) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Full run
// ============================================================================

#[tokio::test]
async fn test_run_harvests_every_page() {
    let server = stac_server(3).await;
    let store = Arc::new(InMemoryObjectStore::new());
    let state = Arc::new(InMemoryStateStore::new());

    let harvester = Harvester::new(
        http(),
        store.clone(),
        state.clone(),
        Arc::new(InMemoryJobQueue::new("jobs")),
        Arc::new(InMemoryJobQueue::new("completions")),
        translation(),
        settings(&server.uri()),
    );

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages, 3);
    assert!(summary.discovery_error.is_none());
    assert_eq!(summary.dispatch.enqueued, 3);
    assert_eq!(summary.work.acked, 3);
    assert!(summary.progress.is_complete());
    assert!(summary.progress.stuck_jobs.is_empty());
    assert!(summary.fired);

    let batch = state.get_batch(&summary.dispatch.batch_id).await.unwrap().unwrap();
    assert!(batch.gathered);

    let keys = store.keys("processed").await;
    assert_eq!(keys.len(), 8);
    assert!(keys.contains(&"eodms-root-eodms-datacube.geojson".to_string()));
    assert!(keys.contains(&"eodms-collection-rcm-ard.geojson".to_string()));
    assert!(keys.contains(&"eodms-rcm-ard-P2_B.geojson".to_string()));

    let body = store
        .get("processed", "eodms-rcm-ard-P0_A.geojson")
        .await
        .unwrap()
        .unwrap();
    let document: Value = serde_json::from_slice(&body).unwrap();
    let props = &document["features"][0]["properties"];
    assert_eq!(props["title"]["en"], "Record - P0-A-RCM ARD");
    assert_eq!(props["parentIdentifier"], "eodms-rcm-ard");
    assert_eq!(props["eoFilters"][0]["polarizations"], "HH + HV");
    assert_eq!(
        props["geometry"],
        "POLYGON((-75.12 45.0, -74.0 45.0, -74.0 46.0, -75.12 46.0, -75.12 45.0))"
    );

    assert_eq!(store.keys("links").await, vec!["rcm-ard-item-api.json"]);
    assert_eq!(store.keys("runs").await.len(), 3);
}

#[tokio::test]
async fn test_empty_collection_completes_immediately() {
    let server = stac_server(0).await;
    let harvester = Harvester::new(
        http(),
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(InMemoryJobQueue::new("jobs")),
        Arc::new(InMemoryJobQueue::new("completions")),
        translation(),
        settings(&server.uri()),
    );

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.pages, 0);
    assert_eq!(summary.dispatch.total_jobs, 0);
    assert!(summary.fired);
}

// ============================================================================
// Ordering and failures
// ============================================================================

struct Stages {
    state: Arc<InMemoryStateStore>,
    jobs: Arc<InMemoryJobQueue>,
    completions: Arc<InMemoryJobQueue>,
    aggregator: ProgressAggregator,
    watcher: BatchWatcher,
    handler: Arc<CountingHandler>,
}

impl Stages {
    fn new() -> Self {
        let state = Arc::new(InMemoryStateStore::new());
        let completions = Arc::new(InMemoryJobQueue::new("completions"));
        let handler = Arc::new(CountingHandler::default());
        Self {
            aggregator: ProgressAggregator::new(state.clone(), completions.clone()).with_batch_size(1),
            watcher: BatchWatcher::new(state.clone(), handler.clone()),
            jobs: Arc::new(InMemoryJobQueue::new("jobs")),
            state,
            completions,
            handler,
        }
    }

    fn worker(&self, api_root: &str, store: Arc<dyn ObjectStore>) -> Worker {
        Worker::new(
            http(),
            store,
            self.state.clone(),
            self.completions.clone(),
            Arc::new(translation()),
            WorkerSettings {
                api_root: api_root.to_string(),
                processed_bucket: "processed".into(),
                run_log_bucket: "runs".into(),
            },
        )
    }

    /// Apply pending signals one at a time; returns how often the watcher fired
    async fn aggregate(&self) -> usize {
        let mut fired = 0;
        loop {
            let report = self.aggregator.poll().await.unwrap();
            if report.received == 0 {
                return fired;
            }
            for counter in &report.updated {
                if self.watcher.observe(counter).await.unwrap() {
                    fired += 1;
                }
            }
        }
    }
}

fn page_urls(server: &MockServer, pages: usize) -> Vec<PageDescriptor> {
    (0..pages)
        .map(|n| {
            let url = if n == 0 {
                format!("{}/collections/{}/items", server.uri(), COLLECTION)
            } else {
                format!("{}/collections/{}/items/page{}", server.uri(), COLLECTION, n)
            };
            PageDescriptor::new(COLLECTION, url)
        })
        .collect()
}

#[tokio::test]
async fn test_out_of_order_completion_fires_once() {
    let server = stac_server(3).await;
    let stages = Stages::new();
    let worker = stages.worker(&server.uri(), Arc::new(InMemoryObjectStore::new()));

    let report = JobDispatcher::new(stages.state.clone(), stages.jobs.clone())
        .dispatch_batch("batch-ooo", &page_urls(&server, 3))
        .await
        .unwrap();
    assert_eq!(report.enqueued, 3);

    let mut messages: Vec<JobMessage> = stages
        .jobs
        .receive(3)
        .await
        .unwrap()
        .iter()
        .map(|d| JobMessage::from_slice(&d.payload).unwrap())
        .collect();
    messages.sort_by_key(|m| std::cmp::Reverse(m.index));

    let mut fired = 0;
    for (n, message) in messages.iter().enumerate() {
        let job = worker.process(message).await.unwrap();
        assert!(job.signalled);
        fired += stages.aggregate().await;

        let progress = stages.aggregator.progress("batch-ooo").await.unwrap();
        assert_eq!(progress.finished, n as i64 + 1);
        if n < 2 {
            assert_eq!(fired, 0);
        }
    }

    // a redelivered job changes nothing
    assert!(!worker.process(&messages[0]).await.unwrap().signalled);
    fired += stages.aggregate().await;

    assert_eq!(fired, 1);
    assert_eq!(stages.handler.calls.load(Ordering::SeqCst), 1);
}

/// Fails every write to one key
struct FailingKeyStore {
    inner: InMemoryObjectStore,
    poisoned: String,
}

#[async_trait]
impl ObjectStore for FailingKeyStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<PutReceipt> {
        if key == self.poisoned {
            return Err(HarvestError::Storage(format!("write to {} refused", key)));
        }
        self.inner.put(bucket, key, data).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner.delete(bucket, key).await
    }
}

#[tokio::test]
async fn test_storage_failure_leaves_batch_incomplete() {
    let server = stac_server(2).await;
    let stages = Stages::new();
    let store = Arc::new(FailingKeyStore {
        inner: InMemoryObjectStore::new(),
        poisoned: "eodms-rcm-ard-P1_B.geojson".into(),
    });
    let worker = Arc::new(stages.worker(&server.uri(), store));

    JobDispatcher::new(stages.state.clone(), stages.jobs.clone())
        .dispatch_batch("batch-fail", &page_urls(&server, 2))
        .await
        .unwrap();

    let summary = worker.drain(stages.jobs.clone(), 2).await.unwrap();
    assert_eq!(summary.acked, 1);
    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(stages.aggregate().await, 0);

    let progress = stages.aggregator.progress("batch-fail").await.unwrap();
    assert_eq!((progress.finished, progress.total), (1, 2));
    assert_eq!(progress.stuck_jobs.len(), 1);
    assert!(progress.stuck_jobs[0].starts_with("1_"));

    let stuck = stages
        .state
        .get_job_state("batch-fail", &progress.stuck_jobs[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stuck.status, JobStatus::Started);
    assert_eq!(stages.handler.calls.load(Ordering::SeqCst), 0);
}
