//! GeoCore Harvester
//!
//! Harvests a paginated STAC API into GeoCore records with a scatter-gather
//! pipeline: one discovery pass, one job per page, any number of workers,
//! and an atomic per-batch counter that decides when the batch is done.
//!
//! - [`stac`]: typed source documents, validated at the API boundary
//! - [`geocore`]: pure translation into bilingual GeoCore features
//! - [`pipeline`]: discovery, dispatch, workers, aggregation and the watcher
//! - [`storage`], [`state`], [`queue`], [`http`]: adapters behind traits

pub mod config;
pub mod db;
pub mod geocore;
pub mod http;
pub mod pipeline;
pub mod queue;
pub mod stac;
pub mod state;
pub mod storage;

pub use config::HarvesterConfig;
pub use pipeline::Harvester;
