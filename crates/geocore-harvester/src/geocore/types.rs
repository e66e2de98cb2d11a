//! GeoCore output records
//!
//! Field names and nesting follow the GeoCore GeoJSON schema; absent values
//! serialize as `null` so every record has the same shape.

use serde::{Deserialize, Serialize, Serializer};

/// English/French pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bilingual {
    pub en: String,
    pub fr: String,
}

impl Bilingual {
    pub fn new(en: impl Into<String>, fr: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            fr: fr.into(),
        }
    }

    /// Same text in both languages
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            en: text.clone(),
            fr: text,
        }
    }

    /// Split a `"English / Français"` label on its first slash; a label
    /// without a slash is used for both languages
    pub fn split_pair(label: &str) -> Self {
        match label.split_once('/') {
            Some((en, fr)) => Self::new(en.trim(), fr.trim()),
            None => Self::same(label.trim()),
        }
    }

    pub fn map(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            en: f(&self.en),
            fr: f(&self.fr),
        }
    }
}

/// Bilingual pair whose halves may be unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalBilingual {
    pub en: Option<String>,
    pub fr: Option<String>,
}

impl OptionalBilingual {
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            en: Some(text.clone()),
            fr: Some(text),
        }
    }

    pub fn pair(en: impl Into<String>, fr: impl Into<String>) -> Self {
        Self {
            en: Some(en.into()),
            fr: Some(fr.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineResources {
    #[serde(rename = "onlineResources")]
    pub url: Option<String>,
    #[serde(rename = "onlineResources_Name")]
    pub name: Option<String>,
    #[serde(rename = "onlineResources_Protocol")]
    pub protocol: Option<String>,
    #[serde(rename = "onlineResources_Description")]
    pub description: Option<String>,
}

/// Point of contact block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub organisation: OptionalBilingual,
    pub email: OptionalBilingual,
    pub individual: Option<String>,
    pub position: OptionalBilingual,
    pub telephone: OptionalBilingual,
    pub address: OptionalBilingual,
    pub city: Option<String>,
    pub pt: OptionalBilingual,
    pub postalcode: Option<String>,
    pub country: OptionalBilingual,
    pub online_resources: OnlineResources,
    #[serde(rename = "hoursofService")]
    pub hours_of_service: Option<String>,
    pub role: Option<String>,
}

/// One link or asset exposed to the catalogue UI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GeoCoreOption {
    pub url: String,
    pub protocol: String,
    pub name: Bilingual,
    pub description: Bilingual,
}

/// End of a temporal extent: a formatted timestamp or the open-ended
/// `"Present"` marker. Both serialize as plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndDate {
    Date(String),
    Present,
}

impl EndDate {
    pub const PRESENT: &'static str = "Present";

    pub fn as_str(&self) -> &str {
        match self {
            EndDate::Date(date) => date,
            EndDate::Present => Self::PRESENT,
        }
    }
}

impl Serialize for EndDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporalExtent {
    pub begin: String,
    pub end: EndDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatedText {
    pub text: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordDates {
    pub published: DatedText,
    pub created: DatedText,
}

/// SAR acquisition attributes of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EoFilter {
    pub polarizations: String,
    #[serde(rename = "orbitState")]
    pub orbit_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    #[serde(rename = "type")]
    kind: &'static str,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    pub fn new(ring: Vec<[f64; 2]>) -> Self {
        Self {
            kind: "Polygon",
            coordinates: vec![ring],
        }
    }

    /// Exterior ring
    pub fn ring(&self) -> &[[f64; 2]] {
        self.coordinates.first().map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    pub id: String,
    pub title: Bilingual,
    pub description: Bilingual,
    pub keywords: Bilingual,
    pub topic_category: String,
    pub date: RecordDates,
    #[serde(rename = "type")]
    pub type_data: String,
    /// WKT rendering of the feature geometry
    pub geometry: String,
    pub temporal_extent: TemporalExtent,
    pub parent_identifier: Option<String>,
    pub spatial_representation: String,
    pub status: String,
    pub maintenance: String,
    pub use_limits: Bilingual,
    pub contact: Vec<Contact>,
    pub options: Vec<GeoCoreOption>,
    pub source_system_name: String,
    pub eo_collection: Option<String>,
    pub eo_filters: Option<Vec<EoFilter>>,
}

/// One translated record as a GeoJSON feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    pub geometry: Polygon,
    pub properties: Properties,
}

impl TargetRecord {
    pub fn new(geometry: Polygon, properties: Properties) -> Self {
        Self {
            kind: "Feature",
            geometry,
            properties,
        }
    }

    pub fn id(&self) -> &str {
        &self.properties.id
    }

    /// Wrap into the stored `FeatureCollection` document
    pub fn into_document(self) -> GeoCoreDocument {
        GeoCoreDocument {
            kind: "FeatureCollection",
            features: vec![self],
        }
    }
}

/// Stored artifact: a feature collection holding exactly one record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoCoreDocument {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<TargetRecord>,
}

impl GeoCoreDocument {
    /// Pretty-printed UTF-8 JSON
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        let name = Bilingual::split_pair("EODMS Datacube API / EODMS Cube de données API");
        assert_eq!(name, Bilingual::new("EODMS Datacube API", "EODMS Cube de données API"));
        assert_eq!(Bilingual::split_pair("Thumbnail"), Bilingual::same("Thumbnail"));
        assert_eq!(Bilingual::split_pair("a/b/c"), Bilingual::new("a", "b/c"));
    }

    #[test]
    fn test_end_date_is_a_plain_string() {
        let extent = TemporalExtent {
            begin: "0001-01-01".into(),
            end: EndDate::Present,
        };
        assert_eq!(
            serde_json::to_value(&extent).unwrap(),
            serde_json::json!({"begin": "0001-01-01", "end": "Present"})
        );
    }

    #[test]
    fn test_contact_wire_names() {
        let value = serde_json::to_value(Contact::default()).unwrap();
        let object = value.as_object().unwrap();
        for key in ["postalcode", "onlineResources", "hoursofService", "role", "pt"] {
            assert!(object.contains_key(key), "missing {}", key);
        }
        assert!(value["onlineResources"]
            .as_object()
            .unwrap()
            .contains_key("onlineResources_Protocol"));
    }
}
