//! Page discovery
//!
//! Walks the `next` links of a collection's items endpoint and records one
//! [`PageDescriptor`] per non-empty page. Discovery never fails outright:
//! the pages found before an error are returned alongside it.

use geocore_common::HarvestError;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use super::types::PageDescriptor;
use crate::http::HttpClient;
use crate::stac::ItemPage;

/// Pages found, plus the error that cut discovery short if any
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub pages: Vec<PageDescriptor>,
    pub error: Option<HarvestError>,
}

impl DiscoveryOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// First page of a collection's items
pub fn items_url(base_url: &str, collection_id: &str, page_size: u32) -> String {
    format!(
        "{}/collections/{}/items?limit={}",
        base_url.trim_end_matches('/'),
        collection_id,
        page_size
    )
}

async fn fetch_page(http: &dyn HttpClient, url: &str) -> Result<ItemPage, HarvestError> {
    let response = http.get(url).await?;
    if !response.is_success() {
        return Err(HarvestError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }
    Ok(ItemPage::from_slice(&response.body)?)
}

/// Discover every page of `collection_id`.
///
/// Stops when the running `returned` total reaches `matched`, when a page
/// has no `next` link, returns nothing, or links back to a visited page,
/// or once `max_pages` pages are recorded.
pub async fn discover(
    http: &dyn HttpClient,
    base_url: &str,
    collection_id: &str,
    page_size: u32,
    max_pages: Option<usize>,
) -> DiscoveryOutcome {
    let mut outcome = DiscoveryOutcome::default();
    let mut visited = HashSet::new();
    let mut total_returned: u64 = 0;
    let mut url = items_url(base_url, collection_id, page_size);

    info!(action = "discover_start", collection = %collection_id, url = %url, "Discovering pages");

    loop {
        if max_pages.is_some_and(|max| outcome.pages.len() >= max) {
            warn!(
                action = "discover_capped",
                collection = %collection_id,
                pages = outcome.pages.len(),
                "Page limit reached, stopping discovery"
            );
            break;
        }
        visited.insert(url.clone());

        let page = match fetch_page(http, &url).await {
            Ok(page) => page,
            Err(e) => {
                error!(
                    action = "discover_failed",
                    collection = %collection_id,
                    url = %url,
                    pages = outcome.pages.len(),
                    error = %e,
                    "Page fetch failed, keeping pages found so far"
                );
                outcome.error = Some(e);
                break;
            },
        };

        let returned = page.returned();
        let matched = page.matched();
        if returned == 0 {
            debug!(action = "discover_empty_page", url = %url, "Page returned no records");
            break;
        }

        outcome.pages.push(PageDescriptor::new(collection_id, url.as_str()));
        total_returned += returned;
        debug!(
            action = "discover_page",
            url = %url,
            returned,
            matched = ?matched,
            total_returned,
            "Page discovered"
        );

        if matched.is_some_and(|matched| total_returned >= matched) {
            break;
        }
        let Some(next) = page.next_link() else {
            break;
        };
        if visited.contains(next) {
            warn!(
                action = "discover_cycle",
                url = %next,
                "Next link points to a visited page, stopping discovery"
            );
            break;
        }
        url = next.to_string();
    }

    info!(
        action = "discover_done",
        collection = %collection_id,
        pages = outcome.pages.len(),
        records = total_returned,
        complete = outcome.is_complete(),
        "Discovery finished"
    );
    outcome
}
