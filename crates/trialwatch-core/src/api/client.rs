//! HTTP client for the ClinicalTrials.gov v2 REST API.
//!
//! `ApiClient` is the production [`CatalogGateway`]. It performs single
//! attempts only; retrying is the core's job (see [`super::with_retry`]).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiError, CatalogGateway};
use crate::models::{StudiesResponse, Study};

// ============================================================================
// Constants
// ============================================================================

/// Studies collection endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://clinicaltrials.gov/api/v2/studies";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Largest page the API accepts.
const MAX_PAGE_SIZE: usize = 1000;

/// API client for ClinicalTrials.gov.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client against the public API
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_API_BASE_URL)
    }

    /// Create a client against another deployment (mirrors, test servers)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        debug!(url, bytes = text.len(), "Catalog response received");

        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }
}

#[async_trait]
impl CatalogGateway for ApiClient {
    async fn fetch_page(&self, page_size: usize) -> Result<Vec<Study>, ApiError> {
        let query = [
            ("format", "json".to_string()),
            ("pageSize", page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        let response: StudiesResponse = self.get(&self.base_url, &query).await?;
        Ok(response.studies)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Study, ApiError> {
        let url = format!("{}/{}", self.base_url, id);
        self.get(&url, &[("format", "json".to_string())]).await
    }

    async fn fetch_id_pool(&self, max_ids: usize) -> Result<Vec<String>, ApiError> {
        let query = [
            ("format", "json".to_string()),
            ("fields", "NCTId".to_string()),
            ("pageSize", max_ids.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        let response: StudiesResponse = self.get(&self.base_url, &query).await?;
        let ids: Vec<String> = response
            .studies
            .iter()
            .filter_map(|s| s.nct_id())
            .map(str::to_string)
            .collect();
        debug!(count = ids.len(), "Fetched id pool");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::with_base_url("http://localhost:8080/api/v2/studies/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/api/v2/studies");
    }

    #[test]
    fn test_default_base_url() {
        let client = ApiClient::new().unwrap();
        assert_eq!(client.base_url(), DEFAULT_API_BASE_URL);
    }
}
