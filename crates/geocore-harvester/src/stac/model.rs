use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::StacError;

/// Hyperlink relation of a catalog, collection or item
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Named binary asset; order follows the source document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// WGS84 extent in degrees. Accepts 2D `[w, s, e, n]` and 3D
/// `[w, s, zmin, e, n, zmax]` arrays.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }
}

impl TryFrom<Vec<f64>> for BoundingBox {
    type Error = StacError;

    fn try_from(coords: Vec<f64>) -> Result<Self, Self::Error> {
        let bbox = match coords.as_slice() {
            [w, s, e, n] => Self::new(*w, *s, *e, *n),
            [w, s, _, e, n, _] => Self::new(*w, *s, *e, *n),
            other => return Err(StacError::BboxArity(other.len())),
        };
        if [bbox.west, bbox.south, bbox.east, bbox.north].iter().all(|c| c.is_finite()) {
            Ok(bbox)
        } else {
            Err(StacError::BboxNotFinite)
        }
    }
}

/// Landing page of the STAC API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RootCatalog {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Catalogs carry no extent of their own; the harvest borrows one from
    /// the first listed collection
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpatialExtent {
    #[serde(default)]
    pub bbox: Vec<BoundingBox>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TemporalInterval {
    #[serde(default)]
    pub interval: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Extent {
    #[serde(default)]
    pub spatial: SpatialExtent,
    #[serde(default)]
    pub temporal: TemporalInterval,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub extent: Extent,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: IndexMap<String, Asset>,
}

impl Collection {
    /// Overall extent: the first box of `extent.spatial.bbox`
    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.extent.spatial.bbox.first()
    }

    /// Begin and end of the first temporal interval, either may be open
    pub fn interval(&self) -> (Option<&str>, Option<&str>) {
        match self.extent.temporal.interval.first() {
            Some(pair) => (
                pair.first().and_then(|v| v.as_deref()),
                pair.get(1).and_then(|v| v.as_deref()),
            ),
            None => (None, None),
        }
    }

    /// Title, falling back to the collection id
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.id)
    }

    pub fn from_value(value: Value) -> Result<Self, StacError> {
        let collection: Collection = serde_json::from_value(value)?;
        if collection.bbox().is_none() {
            return Err(StacError::MissingBbox {
                kind: "collection",
                id: collection.id,
            });
        }
        Ok(collection)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemProperties {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub end_datetime: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(rename = "sat:orbit_state", default)]
    pub orbit_state: Option<String>,
    #[serde(rename = "sar:polarizations", default)]
    pub polarizations: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub collection: Option<String>,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: IndexMap<String, Asset>,
    #[serde(default)]
    pub properties: ItemProperties,
}

impl Item {
    pub fn from_value(value: Value) -> Result<Self, StacError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Item title with underscores turned into hyphens, falling back to the id
    pub fn display_title(&self) -> String {
        self.properties
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.id)
            .replace('_', "-")
    }
}

/// One source record, closed over the three STAC document kinds
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    RootCatalog(RootCatalog),
    Collection(Collection),
    Item(Item),
}

impl SourceRecord {
    /// Validate a raw document, dispatching on its `type` member
    pub fn from_value(value: Value) -> Result<Self, StacError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "Catalog" => Ok(SourceRecord::RootCatalog(serde_json::from_value(value)?)),
            "Collection" => Ok(SourceRecord::Collection(Collection::from_value(value)?)),
            "Feature" => Ok(SourceRecord::Item(Item::from_value(value)?)),
            _ => Err(StacError::UnknownType(kind)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SourceRecord::RootCatalog(root) => &root.id,
            SourceRecord::Collection(collection) => &collection.id,
            SourceRecord::Item(item) => &item.id,
        }
    }
}
