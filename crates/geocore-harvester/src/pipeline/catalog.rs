//! Root catalog and collection records
//!
//! The landing page and `/collections` are fetched once per run. They feed
//! the parent context used by item translation and are themselves
//! translated and stored next to the items.

use geocore_common::Result;
use tracing::{info, warn};

use super::types::{collection_key, root_key};
use crate::geocore::{
    translate_collection, translate_root, CollectionContext, ParentContext, TargetRecord,
    TranslationConfig,
};
use crate::http::{fetch_json, HttpClient};
use crate::stac::{Collection, CollectionList, RootCatalog};
use crate::storage::{ObjectStore, PutReceipt};

/// Landing page plus every valid collection the API lists
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub root: RootCatalog,
    pub collections: Vec<Collection>,
}

impl CatalogSnapshot {
    pub async fn fetch(http: &dyn HttpClient, api_root: &str) -> Result<Self> {
        let api_root = api_root.trim_end_matches('/');
        let mut root: RootCatalog = fetch_json(http, api_root).await?;

        let collections_url = format!("{}/collections", api_root);
        let listing: CollectionList = fetch_json(http, &collections_url).await?;
        let collections: Vec<Collection> = listing
            .collections()
            .filter_map(|parsed| match parsed {
                Ok(collection) => Some(collection),
                Err(e) => {
                    warn!(action = "collection_skipped", error = %e, "Skipping invalid collection");
                    None
                },
            })
            .collect();

        // Catalogs rarely carry a bbox; the first listed collection stands in
        if root.bbox.is_none() {
            root.bbox = collections.first().and_then(|c| c.bbox().copied());
        }

        Ok(Self { root, collections })
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn parent_context(&self, config: &TranslationConfig) -> ParentContext {
        let mut context = ParentContext::new(&self.root.id);
        for collection in &self.collections {
            context.insert(CollectionContext::from_collection(collection, config));
        }
        context
    }
}

/// Fetch the catalog and build the lookup item translation needs
pub async fn resolve_parent_context(
    http: &dyn HttpClient,
    api_root: &str,
    config: &TranslationConfig,
) -> Result<ParentContext> {
    let snapshot = CatalogSnapshot::fetch(http, api_root).await?;
    let context = snapshot.parent_context(config);
    info!(
        action = "parent_context_resolved",
        root_id = %context.root_id(),
        collections = context.collection_count(),
        "Resolved parent context"
    );
    Ok(context)
}

/// Keys written by [`harvest_catalog`]
#[derive(Debug, Clone, Default)]
pub struct CatalogReport {
    pub root: Option<PutReceipt>,
    pub collection: Option<PutReceipt>,
}

async fn store_record(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    record: TargetRecord,
) -> Result<PutReceipt> {
    let id = record.id().to_string();
    let body = record.into_document().to_bytes()?;
    let receipt = store.put(bucket, key, body).await?;
    info!(action = "record_uploaded", id = %id, bucket = %bucket, key = %key, "Uploaded record");
    Ok(receipt)
}

/// Translate and store the root catalog and the harvested collection.
///
/// A record that cannot be translated is logged and left out of the report;
/// storage failures are returned.
pub async fn harvest_catalog(
    snapshot: &CatalogSnapshot,
    store: &dyn ObjectStore,
    bucket: &str,
    config: &TranslationConfig,
) -> Result<CatalogReport> {
    let parents = snapshot.parent_context(config);
    let mut report = CatalogReport::default();

    match translate_root(&snapshot.root, config, &parents) {
        Ok(record) => {
            let key = root_key(&config.source, parents.root_id());
            report.root = Some(store_record(store, bucket, &key, record).await?);
        },
        Err(e) => warn!(action = "translate_failed", id = %snapshot.root.id, error = %e, "Skipping root catalog"),
    }

    let Some(collection) = snapshot.collection(&config.eo_collection) else {
        warn!(
            action = "collection_missing",
            collection = %config.eo_collection,
            "Harvested collection is not listed by the API"
        );
        return Ok(report);
    };
    match translate_collection(collection, config, &parents) {
        Ok(record) => {
            let key = collection_key(&config.source, &collection.id);
            report.collection = Some(store_record(store, bucket, &key, record).await?);
        },
        Err(e) => {
            warn!(action = "translate_failed", id = %collection.id, error = %e, "Skipping collection")
        },
    }

    Ok(report)
}
