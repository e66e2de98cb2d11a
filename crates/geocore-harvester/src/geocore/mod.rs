//! GeoCore translation
//!
//! Maps validated STAC records into bilingual GeoCore features. Nothing in
//! this module performs I/O.

pub mod config;
pub mod geometry;
pub mod options;
pub mod temporal;
pub mod translate;
pub mod types;

pub use config::{
    CollectionContext, ParentContext, StaticMetadata, TranslationConfig, DISCLAIMER_EN,
    DISCLAIMER_FR,
};
pub use translate::{
    collection_record_id, item_record_id, polarization_to_string, root_record_id, translate,
    translate_collection, translate_item, translate_root,
};
pub use types::{Bilingual, GeoCoreDocument, GeoCoreOption, TargetRecord};
