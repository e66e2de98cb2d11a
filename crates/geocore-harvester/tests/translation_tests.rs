//! Translation of complete STAC documents into stored GeoCore documents

use geocore_harvester::geocore::{translate, CollectionContext, ParentContext, TranslationConfig};
use geocore_harvester::stac::{Collection, SourceRecord, StacError};
use serde_json::{json, Value};

fn config() -> TranslationConfig {
    TranslationConfig::new(
        "eodms",
        "ccmeo-eodms",
        "EODMS Datacube API / EODMS Cube de données API",
        "rcm-ard",
    )
}

fn parents(config: &TranslationConfig) -> ParentContext {
    let collection = Collection::from_value(json!({
        "type": "Collection",
        "id": "rcm-ard",
        "title": "RCM ARD",
        "keywords": ["RCM", "SAR"],
        "extent": {
            "spatial": {"bbox": [[-141.0, 41.68, -52.62, 83.11]]},
            "temporal": {"interval": [["2019-06-12T00:00:00.000Z", null]]}
        }
    }))
    .unwrap();
    ParentContext::new("eodms datacube")
        .with_collection(CollectionContext::from_collection(&collection, config))
}

fn item(properties: Value) -> Value {
    json!({
        "type": "Feature",
        "id": "RCM1_OK1234_RCM_ARD",
        "collection": "rcm-ard",
        "bbox": [-75.1234, 45.0, -74.0, 46.0],
        "properties": properties,
        "links": [
            {"rel": "self", "href": "https://stac/items/RCM1_OK1234_RCM_ARD", "type": "application/geo+json"},
            {"rel": "collection", "href": "https://stac/collections/rcm-ard", "type": "application/json"}
        ],
        "assets": {
            "thumbnail": {"href": "https://s3/t.png", "type": "image/png", "title": "Thumbnail/Vignette"}
        }
    })
}

fn document(raw: Value) -> Value {
    let config = config();
    let record = SourceRecord::from_value(raw).unwrap();
    let bytes = translate(&record, &config, &parents(&config))
        .unwrap()
        .into_document()
        .to_bytes()
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_item_document_shape() {
    let doc = document(item(json!({"datetime": "2023-05-01T10:20:30.123Z"})));

    assert_eq!(doc["type"], "FeatureCollection");
    assert_eq!(doc["features"].as_array().unwrap().len(), 1);

    let feature = &doc["features"][0];
    assert_eq!(feature["type"], "Feature");
    assert_eq!(feature["geometry"]["type"], "Polygon");
    assert_eq!(
        feature["geometry"]["coordinates"][0],
        json!([[-75.12, 45.0], [-74.0, 45.0], [-74.0, 46.0], [-75.12, 46.0], [-75.12, 45.0]])
    );

    let props = &feature["properties"];
    assert_eq!(props["id"], "eodms-rcm-ard-RCM1_OK1234_RCM_ARD");
    assert_eq!(props["title"]["en"], "Record - RCM1-OK1234-RCM-ARD-RCM ARD");
    assert_eq!(props["title"]["fr"], "Ficher - RCM1-OK1234-RCM-ARD-RCM ARD");
    assert_eq!(props["keywords"]["en"], "SpatioTemporal Asset Catalog, stac, RCM, SAR");
    assert_eq!(props["parentIdentifier"], "eodms-rcm-ard");
    assert_eq!(props["eoCollection"], "rcm-ard");
    assert_eq!(props["sourceSystemName"], "ccmeo-eodms");
    assert_eq!(
        props["geometry"],
        "POLYGON((-75.12 45.0, -74.0 45.0, -74.0 46.0, -75.12 46.0, -75.12 45.0))"
    );
    assert_eq!(props["options"].as_array().unwrap().len(), 2);
}

#[test]
fn test_polarization_and_orbit_filters() {
    let cases = [
        (json!({"sar:polarizations": ["VV"]}), "VV"),
        (json!({"sar:polarizations": ["HH", "HV"]}), "HH + HV"),
        (json!({"sar:polarizations": ["HH", "VV"]}), "HH + VV"),
        (json!({"sar:polarizations": ["HH", "HV", "VV"]}), "Invalid polarization list"),
        (json!({}), "None"),
    ];

    for (properties, expected) in cases {
        let doc = document(item(properties));
        let filter = &doc["features"][0]["properties"]["eoFilters"][0];
        assert_eq!(filter["polarizations"], expected);
        assert_eq!(filter["orbitState"], "None");
    }

    let doc = document(item(json!({"sat:orbit_state": "ascending"})));
    assert_eq!(doc["features"][0]["properties"]["eoFilters"][0]["orbitState"], "ascending");
}

#[test]
fn test_translation_is_byte_identical() {
    let config = config();
    let parents = parents(&config);
    let record = SourceRecord::from_value(item(json!({
        "datetime": "2023-05-01T10:20:30.123Z",
        "sar:polarizations": ["HH", "HV"]
    })))
    .unwrap();

    let first = translate(&record, &config, &parents).unwrap().into_document().to_bytes().unwrap();
    let second = translate(&record, &config, &parents).unwrap().into_document().to_bytes().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_invalid_documents_are_rejected() {
    assert!(matches!(
        SourceRecord::from_value(json!({"type": "Mystery", "id": "x"})),
        Err(StacError::UnknownType(kind)) if kind == "Mystery"
    ));

    let mut no_bbox = item(json!({}));
    no_bbox.as_object_mut().unwrap().remove("bbox");
    assert!(SourceRecord::from_value(no_bbox).is_err());

    let config = config();
    let mut orphan = item(json!({}));
    orphan.as_object_mut().unwrap().remove("collection");
    let record = SourceRecord::from_value(orphan).unwrap();
    assert!(matches!(
        translate(&record, &config, &parents(&config)),
        Err(StacError::MissingCollection(_))
    ));
}
