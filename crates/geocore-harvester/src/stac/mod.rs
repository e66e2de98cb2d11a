//! Typed STAC documents
//!
//! Source JSON is validated here, at the API boundary. A document that does
//! not deserialize into one of these types is logged and skipped by the
//! caller; nothing downstream handles untyped maps.

use geocore_common::HarvestError;
use thiserror::Error;

mod model;
mod page;

pub use model::{
    Asset, BoundingBox, Collection, Extent, Item, ItemProperties, Link, RootCatalog, SourceRecord,
    SpatialExtent, TemporalInterval,
};
pub use page::{CollectionList, ItemPage, PageContext};

#[derive(Debug, Error)]
pub enum StacError {
    #[error("bounding box must have 4 or 6 coordinates, got {0}")]
    BboxArity(usize),

    #[error("bounding box coordinates must be finite numbers")]
    BboxNotFinite,

    #[error("{kind} '{id}' has no bounding box")]
    MissingBbox { kind: &'static str, id: String },

    #[error("item '{0}' does not name its collection")]
    MissingCollection(String),

    #[error("unsupported STAC document type '{0}'")]
    UnknownType(String),

    #[error("invalid STAC document: {0}")]
    Invalid(#[from] serde_json::Error),
}

impl From<StacError> for HarvestError {
    fn from(err: StacError) -> Self {
        HarvestError::Parse(err.to_string())
    }
}
