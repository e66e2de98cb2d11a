//! Scatter-gather harvest pipeline
//!
//! Stages in data-flow order: [`discovery`] finds pages, [`dispatcher`]
//! fans them out as jobs, [`worker`] translates and stores each page,
//! [`aggregator`] counts completions and [`watcher`] fires once a batch is
//! done. [`runner`] wires them to concrete adapters.

pub mod aggregator;
pub mod catalog;
pub mod discovery;
pub mod dispatcher;
pub mod runner;
pub mod types;
pub mod watcher;
pub mod worker;

pub use aggregator::{AggregationReport, BatchProgress, ProgressAggregator};
pub use catalog::{harvest_catalog, resolve_parent_context, CatalogReport, CatalogSnapshot};
pub use discovery::{discover, DiscoveryOutcome};
pub use dispatcher::{DispatchReport, JobDispatcher};
pub use runner::{DiscoveryRun, Harvester, RunSettings, RunSummary};
pub use types::{CompletionSignal, ItemState, JobMessage, PageDescriptor};
pub use watcher::{BatchCompletionHandler, BatchWatcher, LoggingCompletionHandler};
pub use worker::{DeliveryOutcome, JobReport, WorkSummary, Worker, WorkerSettings};
