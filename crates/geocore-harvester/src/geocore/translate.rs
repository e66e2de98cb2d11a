//! STAC record to GeoCore record mapping
//!
//! Translation is pure: identical inputs always serialize to identical
//! bytes. Records that fail here are skipped by the caller.

use super::config::{CollectionContext, ParentContext, TranslationConfig};
use super::geometry::{to_polygon, to_wkt};
use super::options::{asset_options, dedup_options, link_options, LinkNaming, RecordKind};
use super::temporal::{collection_extent, item_dates, item_extent, root_extent};
use super::types::{
    Bilingual, EoFilter, GeoCoreOption, Properties, RecordDates, TargetRecord, TemporalExtent,
};
use crate::stac::{BoundingBox, Collection, Item, RootCatalog, SourceRecord, StacError};

pub const KEYWORD_PREFIX: &str = "SpatioTemporal Asset Catalog, stac";

const NO_VALUE: &str = "None";
const INVALID_POLARIZATIONS: &str = "Invalid polarization list";

pub fn translate(
    record: &SourceRecord,
    config: &TranslationConfig,
    parents: &ParentContext,
) -> Result<TargetRecord, StacError> {
    match record {
        SourceRecord::RootCatalog(root) => translate_root(root, config, parents),
        SourceRecord::Collection(collection) => translate_collection(collection, config, parents),
        SourceRecord::Item(item) => translate_item(item, config, parents),
    }
}

pub fn root_record_id(parents: &ParentContext) -> String {
    format!("{}-root", parents.root_id())
}

pub fn collection_record_id(config: &TranslationConfig, collection_id: &str) -> String {
    format!("{}-{}", config.source, collection_id)
}

pub fn item_record_id(config: &TranslationConfig, collection_id: &str, item_id: &str) -> String {
    format!("{}-{}-{}", config.source, collection_id, item_id)
}

fn keywords(rest: &Bilingual) -> Bilingual {
    rest.map(|words| {
        if words.is_empty() {
            KEYWORD_PREFIX.to_string()
        } else {
            format!("{}, {}", KEYWORD_PREFIX, words)
        }
    })
}

/// `"A + B"` for a dual-pol list, the value for a single one
pub fn polarization_to_string(polarizations: Option<&[String]>) -> String {
    match polarizations {
        None => NO_VALUE.to_string(),
        Some([single]) => single.clone(),
        Some([first, second]) => format!("{} + {}", first, second),
        Some(_) => INVALID_POLARIZATIONS.to_string(),
    }
}

struct Common {
    id: String,
    title: Bilingual,
    description: Bilingual,
    keywords: Bilingual,
    date: RecordDates,
    temporal_extent: TemporalExtent,
    parent_identifier: Option<String>,
    eo_collection: Option<String>,
    eo_filters: Option<Vec<EoFilter>>,
}

fn build(
    bbox: &BoundingBox,
    options: Vec<GeoCoreOption>,
    common: Common,
    config: &TranslationConfig,
) -> TargetRecord {
    let metadata = &config.metadata;
    let geometry = to_polygon(bbox);
    let properties = Properties {
        id: common.id,
        title: common.title,
        description: common.description,
        keywords: common.keywords,
        topic_category: metadata.topic_category.clone(),
        date: common.date,
        type_data: metadata.type_data.clone(),
        geometry: to_wkt(&geometry),
        temporal_extent: common.temporal_extent,
        parent_identifier: common.parent_identifier,
        spatial_representation: metadata.spatial_representation.clone(),
        status: metadata.status.clone(),
        maintenance: metadata.maintenance.clone(),
        use_limits: metadata.use_limits.clone(),
        contact: metadata.contact.clone(),
        options: dedup_options(options),
        source_system_name: config.source_system_name.clone(),
        eo_collection: common.eo_collection,
        eo_filters: common.eo_filters,
    };
    TargetRecord::new(geometry, properties)
}

/// Collection and item descriptions: the configured text plus disclaimer
fn configured_description(config: &TranslationConfig) -> Bilingual {
    let metadata = &config.metadata;
    Bilingual::new(
        format!("{} {}", metadata.collection_description.en, metadata.disclaimer.en),
        format!("{} {}", metadata.collection_description.fr, metadata.disclaimer.fr),
    )
}

/// The root needs a bbox; the catalog stage fills it from the first listed
/// collection when the API omits it.
pub fn translate_root(
    root: &RootCatalog,
    config: &TranslationConfig,
    parents: &ParentContext,
) -> Result<TargetRecord, StacError> {
    let bbox = root.bbox.as_ref().ok_or_else(|| StacError::MissingBbox {
        kind: "catalog",
        id: root.id.clone(),
    })?;
    let id = root_record_id(parents);
    let root_name = &config.root_name;
    let disclaimer = &config.metadata.disclaimer;
    let description = match root.description.as_deref().filter(|d| !d.is_empty()) {
        Some(text) => Bilingual::new(
            format!("{}.{}", text, disclaimer.en),
            format!("{}.{}", text, disclaimer.fr),
        ),
        None => disclaimer.clone(),
    };

    let naming = LinkNaming {
        kind: RecordKind::Root,
        id: &root.id,
        root_name,
        parent_title: None,
    };

    Ok(build(
        bbox,
        link_options(&root.links, &naming),
        Common {
            id,
            title: Bilingual::new(
                format!("Root - {}", root_name.en),
                format!("Racine - {}", root_name.fr),
            ),
            description,
            keywords: keywords(&Bilingual::same(config.source.as_str())),
            date: RecordDates::default(),
            temporal_extent: root_extent(),
            parent_identifier: None,
            eo_collection: None,
            eo_filters: None,
        },
        config,
    ))
}

pub fn translate_collection(
    collection: &Collection,
    config: &TranslationConfig,
    parents: &ParentContext,
) -> Result<TargetRecord, StacError> {
    let bbox = collection.bbox().ok_or_else(|| StacError::MissingBbox {
        kind: "collection",
        id: collection.id.clone(),
    })?;
    let context = CollectionContext::from_collection(collection, config);
    let (begin, end) = collection.interval();

    let naming = LinkNaming {
        kind: RecordKind::Collection,
        id: &collection.id,
        root_name: &config.root_name,
        parent_title: None,
    };
    let mut options = link_options(&collection.links, &naming);
    options.extend(asset_options(&collection.assets));

    Ok(build(
        bbox,
        options,
        Common {
            id: collection_record_id(config, &collection.id),
            title: context.title.map(|t| format!("Collection - {}", t)),
            description: configured_description(config),
            keywords: keywords(&context.keywords),
            date: RecordDates::default(),
            temporal_extent: collection_extent(begin, end),
            parent_identifier: Some(root_record_id(parents)),
            eo_collection: Some(config.eo_collection.clone()),
            eo_filters: None,
        },
        config,
    ))
}

pub fn translate_item(
    item: &Item,
    config: &TranslationConfig,
    parents: &ParentContext,
) -> Result<TargetRecord, StacError> {
    let collection_id = item
        .collection
        .as_deref()
        .ok_or_else(|| StacError::MissingCollection(item.id.clone()))?;
    let unlisted;
    let context = match parents.collection(collection_id) {
        Some(context) => context,
        None => {
            unlisted = CollectionContext::unlisted(collection_id);
            &unlisted
        },
    };
    let item_title = item.display_title();
    let properties = &item.properties;

    let naming = LinkNaming {
        kind: RecordKind::Item,
        id: &item.id,
        root_name: &config.root_name,
        parent_title: Some(&context.title),
    };
    let mut options = link_options(&item.links, &naming);
    options.extend(asset_options(&item.assets));

    Ok(build(
        &item.bbox,
        options,
        Common {
            id: item_record_id(config, collection_id, &item.id),
            title: Bilingual::new(
                format!("Record - {}-{}", item_title, context.title.en),
                format!("Ficher - {}-{}", item_title, context.title.fr),
            ),
            description: configured_description(config),
            keywords: keywords(&context.keywords),
            date: item_dates(properties),
            temporal_extent: item_extent(properties),
            parent_identifier: Some(collection_record_id(config, collection_id)),
            eo_collection: Some(config.eo_collection.clone()),
            eo_filters: Some(vec![EoFilter {
                polarizations: polarization_to_string(properties.polarizations.as_deref()),
                orbit_state: properties
                    .orbit_state
                    .clone()
                    .unwrap_or_else(|| NO_VALUE.to_string()),
            }]),
        },
        config,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn config() -> TranslationConfig {
        TranslationConfig::new(
            "eodms",
            "ccmeo-eodms",
            "EODMS Datacube API / EODMS Cube de données API",
            "rcm-ard",
        )
    }

    fn collection() -> Collection {
        Collection::from_value(json!({
            "type": "Collection",
            "id": "rcm-ard",
            "title": "rcm-ard",
            "description": "RCM analysis ready data",
            "keywords": ["RCM", "SAR"],
            "extent": {
                "spatial": {"bbox": [[-141.0, 41.68, -52.62, 83.11]]},
                "temporal": {"interval": [["2019-06-12T00:00:00.000Z", null]]}
            },
            "links": [
                {"rel": "self", "href": "https://api/collections/rcm-ard", "type": "application/json"},
                {"rel": "root", "href": "https://api/", "type": "application/json"},
                {"rel": "items", "href": "https://api/collections/rcm-ard/items", "type": "application/geo+json"},
                {"rel": "parent", "href": "https://api/", "type": "application/json"}
            ]
        }))
        .unwrap()
    }

    fn parents() -> ParentContext {
        ParentContext::new("eodms datacube")
            .with_collection(CollectionContext::from_collection(&collection(), &config()))
    }

    fn item(polarizations: Value) -> Item {
        Item::from_value(json!({
            "type": "Feature",
            "id": "RCM1_OK1234_RCM_ARD",
            "collection": "rcm-ard",
            "bbox": [-75.123, 45.0, -74.999, 45.456],
            "links": [
                {"rel": "self", "href": "https://api/collections/rcm-ard/items/1", "type": "application/geo+json"},
                {"rel": "collection", "href": "https://api/collections/rcm-ard", "type": "application/json"},
                {"rel": "parent", "href": "https://api/collections/rcm-ard", "type": "application/json"}
            ],
            "assets": {
                "thumbnail": {"href": "https://s3/t.png", "type": "image/png", "title": "Thumbnail/Vignette"}
            },
            "properties": {
                "datetime": "2023-05-01T10:20:30.123Z",
                "end_datetime": "2023-05-01T10:21:30.123Z",
                "created": "2023-05-02T00:00:00.000Z",
                "sat:orbit_state": "ascending",
                "sar:polarizations": polarizations
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_polarization_strings() {
        let list = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let render = |values: &[&str]| polarization_to_string(Some(list(values).as_slice()));
        assert_eq!(render(&["HH", "HV"]), "HH + HV");
        assert_eq!(render(&["HH", "VV"]), "HH + VV");
        assert_eq!(render(&["VV"]), "VV");
        assert_eq!(polarization_to_string(None), "None");
        assert_eq!(render(&["HH", "HV", "VV"]), "Invalid polarization list");
        assert_eq!(render(&[]), "Invalid polarization list");
    }

    #[test]
    fn test_item_translation() {
        let record = translate_item(&item(json!(["HH", "HV"])), &config(), &parents()).unwrap();
        let props = &record.properties;

        assert_eq!(props.id, "eodms-rcm-ard-RCM1_OK1234_RCM_ARD");
        assert_eq!(props.title.en, "Record - RCM1-OK1234-RCM-ARD-rcm-ard");
        assert_eq!(props.title.fr, "Ficher - RCM1-OK1234-RCM-ARD-rcm-ard");
        assert_eq!(props.parent_identifier.as_deref(), Some("eodms-rcm-ard"));
        assert_eq!(props.keywords.en, "SpatioTemporal Asset Catalog, stac, RCM, SAR");
        assert!(props.keywords.fr.starts_with("SpatioTemporal Asset Catalog, stac, MCR"));
        assert_eq!(
            props.geometry,
            "POLYGON((-75.12 45.0, -75.0 45.0, -75.0 45.46, -75.12 45.46, -75.12 45.0))"
        );
        assert_eq!(props.temporal_extent.begin, "2023-05-01T10:20:30.123Z");
        assert_eq!(props.temporal_extent.end.as_str(), "2023-05-01T10:21:30.123Z");
        assert_eq!(props.date.created.date.as_deref(), Some("2023-05-02T00:00:00.000Z"));
        assert_eq!(props.eo_collection.as_deref(), Some("rcm-ard"));

        let filters = props.eo_filters.as_ref().unwrap();
        assert_eq!(filters[0].polarizations, "HH + HV");
        assert_eq!(filters[0].orbit_state, "ascending");

        let names: Vec<&str> = props.options.iter().map(|o| o.name.en.as_str()).collect();
        assert_eq!(
            names,
            vec!["Self - RCM1_OK1234_RCM_ARD", "Parent - rcm-ard", "Asset - Thumbnail"]
        );
        assert!(props.description.en.ends_with(crate::geocore::DISCLAIMER_EN));
    }

    #[test]
    fn test_item_without_polarizations() {
        let record = translate_item(&item(Value::Null), &config(), &parents()).unwrap();
        let filters = record.properties.eo_filters.unwrap();
        assert_eq!(filters[0].polarizations, "None");
    }

    #[test]
    fn test_item_in_unlisted_collection() {
        let mut source = item(json!(["VV"]));
        source.collection = Some("other".to_string());
        let record = translate_item(&source, &config(), &parents()).unwrap();
        assert_eq!(record.properties.title.en, "Record - RCM1-OK1234-RCM-ARD-other");
        assert_eq!(record.properties.keywords.en, KEYWORD_PREFIX);
        assert_eq!(record.properties.options[1].name.en, "Parent - other");

        source.collection = None;
        assert!(matches!(
            translate_item(&source, &config(), &parents()),
            Err(StacError::MissingCollection(_))
        ));
    }

    #[test]
    fn test_collection_translation() {
        let record = translate_collection(&collection(), &config(), &parents()).unwrap();
        let props = &record.properties;

        assert_eq!(props.id, "eodms-rcm-ard");
        assert_eq!(props.title, Bilingual::same("Collection - rcm-ard"));
        assert_eq!(props.parent_identifier.as_deref(), Some("eodms-datacube-root"));
        assert_eq!(props.temporal_extent.begin, "2019-06-12T00:00:00.000Z");
        assert_eq!(props.temporal_extent.end.as_str(), "Present");
        assert!(props.eo_filters.is_none());

        let names: Vec<(&str, &str)> = props
            .options
            .iter()
            .map(|o| (o.name.en.as_str(), o.name.fr.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Self - rcm-ard", "Soi - rcm-ard"),
                ("Root - EODMS Datacube API", "Racine - EODMS Cube de données API"),
                ("Items API", "Éléments la API"),
                ("Parent links", "Parente liens"),
            ]
        );
    }

    #[test]
    fn test_root_translation() {
        let mut root: RootCatalog = serde_json::from_value(json!({
            "type": "Catalog",
            "id": "eodms datacube",
            "description": "EODMS STAC API",
            "links": [
                {"rel": "self", "href": "https://api/", "type": "application/json"},
                {"rel": "data", "href": "https://api/collections", "type": "application/json"},
                {"rel": "root", "href": "https://api/", "type": "application/json"}
            ]
        }))
        .unwrap();

        assert!(matches!(
            translate_root(&root, &config(), &parents()),
            Err(StacError::MissingBbox { .. })
        ));

        root.bbox = collection().bbox().cloned();
        let record = translate_root(&root, &config(), &parents()).unwrap();
        let props = &record.properties;
        assert_eq!(props.id, "eodms-datacube-root");
        assert_eq!(props.title.en, "Root - EODMS Datacube API");
        assert_eq!(props.title.fr, "Racine - EODMS Cube de données API");
        assert!(props.description.en.starts_with("EODMS STAC API.\\n\\n**"));
        assert_eq!(props.keywords, Bilingual::same("SpatioTemporal Asset Catalog, stac, eodms"));
        assert!(props.parent_identifier.is_none());
        assert_eq!(props.temporal_extent.begin, "0001-01-01");
        // self and root links collapse into one option
        assert_eq!(props.options.len(), 2);
        assert_eq!(props.options[0].name.en, "Collection - EODMS Datacube API");
        assert_eq!(props.options[1].name.en, "Root - EODMS Datacube API");
    }

    #[test]
    fn test_translation_is_byte_identical() {
        let record = SourceRecord::Item(item(json!(["HH", "HV"])));
        let first = translate(&record, &config(), &parents()).unwrap().into_document();
        let second = translate(&record, &config(), &parents()).unwrap().into_document();
        assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
    }

    #[test]
    fn test_document_shape() {
        let record = translate_item(&item(json!(["HH"])), &config(), &parents()).unwrap();
        let value: Value = serde_json::to_value(record.into_document()).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        let feature = &value["features"][0];
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert_eq!(feature["geometry"]["coordinates"][0][0], json!([-75.12, 45.0]));
        let props = &feature["properties"];
        assert_eq!(props["parentIdentifier"], "eodms-rcm-ard");
        assert_eq!(props["sourceSystemName"], "ccmeo-eodms");
        assert_eq!(props["eoFilters"][0]["orbitState"], "ascending");
        assert_eq!(props["temporalExtent"]["end"], "2023-05-01T10:21:30.123Z");
        assert_eq!(props["options"][0]["protocol"], "Unknown");
        assert_eq!(props["contact"][0]["city"], "Ottawa");
    }
}
