use serde::Deserialize;
use serde_json::Value;

use super::{Collection, Item, Link, StacError};

/// `context` member of a STAC API item search response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub returned: Option<u64>,
    #[serde(default)]
    pub matched: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// One page of `/collections/{id}/items`
///
/// Features stay raw until [`ItemPage::items`] so that one malformed
/// feature only costs that record, not the page.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemPage {
    #[serde(default)]
    pub features: Vec<Value>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub context: Option<PageContext>,
    #[serde(rename = "numberReturned", default)]
    pub number_returned: Option<u64>,
    #[serde(rename = "numberMatched", default)]
    pub number_matched: Option<u64>,
}

impl ItemPage {
    pub fn from_slice(body: &[u8]) -> Result<Self, StacError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Records on this page, from `context.returned`, then `numberReturned`,
    /// then the feature count
    pub fn returned(&self) -> u64 {
        self.context
            .as_ref()
            .and_then(|c| c.returned)
            .or(self.number_returned)
            .unwrap_or(self.features.len() as u64)
    }

    /// Records matching the whole query, when the server reports it
    pub fn matched(&self) -> Option<u64> {
        self.context
            .as_ref()
            .and_then(|c| c.matched)
            .or(self.number_matched)
    }

    /// Target of the last `next` relation on the page
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .iter()
            .rev()
            .find(|link| link.rel == "next")
            .map(|link| link.href.as_str())
    }

    /// Validate every feature independently
    pub fn items(&self) -> impl Iterator<Item = Result<Item, StacError>> + '_ {
        self.features.iter().cloned().map(Item::from_value)
    }
}

/// Response of `/collections`
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionList {
    #[serde(default)]
    pub collections: Vec<Value>,
}

impl CollectionList {
    pub fn collections(&self) -> impl Iterator<Item = Result<Collection, StacError>> + '_ {
        self.collections.iter().cloned().map(Collection::from_value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_prefer_context() {
        let page: ItemPage = serde_json::from_value(json!({
            "features": [],
            "context": {"returned": 5000, "matched": 12000, "limit": 5000},
            "numberReturned": 1,
            "numberMatched": 1
        }))
        .unwrap();
        assert_eq!(page.returned(), 5000);
        assert_eq!(page.matched(), Some(12000));
    }

    #[test]
    fn test_counts_fall_back() {
        let page: ItemPage = serde_json::from_value(json!({
            "features": [{"id": "a"}, {"id": "b"}],
            "numberMatched": 7
        }))
        .unwrap();
        assert_eq!(page.returned(), 2);
        assert_eq!(page.matched(), Some(7));
        assert_eq!(page.next_link(), None);
    }

    #[test]
    fn test_next_link_takes_last() {
        let page: ItemPage = serde_json::from_value(json!({
            "links": [
                {"rel": "self", "href": "http://api/items?page=1"},
                {"rel": "next", "href": "http://api/items?page=2"},
                {"rel": "next", "href": "http://api/items?token=abc"}
            ]
        }))
        .unwrap();
        assert_eq!(page.next_link(), Some("http://api/items?token=abc"));
    }

    #[test]
    fn test_bad_features_are_isolated() {
        let page: ItemPage = serde_json::from_value(json!({
            "features": [
                {"id": "good", "bbox": [0.0, 0.0, 1.0, 1.0]},
                {"id": "bad", "bbox": "nope"}
            ]
        }))
        .unwrap();
        let results: Vec<_> = page.items().collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
