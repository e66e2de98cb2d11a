//! HTTP access to the source STAC API
//!
//! Pipeline stages only see the [`HttpClient`] trait so tests can point them
//! at a mock server or a canned responder.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default timeout for one request to the source API.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const USER_AGENT: &str = concat!("geocore-harvester/", env!("CARGO_PKG_VERSION"));

/// Status and body of a completed request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON, mapping failures to [`HarvestError::Parse`]
    pub fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HarvestError::Parse(format!("malformed JSON from {}: {}", url, e)))
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET request. Transport failures are [`HarvestError::Fetch`];
    /// any status code is returned as a response.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// GET `url`, require a success status and decode the JSON body
pub async fn fetch_json<T: DeserializeOwned>(http: &dyn HttpClient, url: &str) -> Result<T> {
    let response = http.get(url).await?;
    if !response.is_success() {
        return Err(HarvestError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }
    response.json(url)
}

/// [`HttpClient`] backed by `reqwest`
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!(action = "http_get", url = %url, "Fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HarvestError::Fetch(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| HarvestError::Fetch(format!("reading body of {} failed: {}", url, e)))?
            .to_vec();

        debug!(action = "http_get", url = %url, status, bytes = body.len(), "Fetched");

        Ok(HttpResponse { status, body })
    }
}
