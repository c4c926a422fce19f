//! Google Cloud Storage backend
//!
//! Talks to the public JSON API anonymously. CI artifact buckets are
//! world-readable, so no credentials are involved.

use super::{Listing, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

/// GCS backend configuration
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// API endpoint, overridable for emulators
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Anonymous GCS client
#[derive(Clone)]
pub struct GcsStore {
    client: Client,
    endpoint: Url,
}

impl Debug for GcsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsStore")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// Subset of the `objects.list` response we care about
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectsPage {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsStore {
    pub fn new(config: GcsConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = Url::parse(config.endpoint.trim_end_matches('/')).map_err(|e| {
            StoreError::Unavailable(format!("Invalid endpoint {}: {}", config.endpoint, e))
        })?;

        Ok(Self { client, endpoint })
    }

    /// Build `{endpoint}/{segments...}`, percent-encoding each segment
    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable(format!("Endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        page_token: Option<&str>,
    ) -> StoreResult<ObjectsPage> {
        let mut url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", prefix);
            query.append_pair("fields", "items(name),prefixes,nextPageToken");
            if let Some(delimiter) = delimiter {
                query.append_pair("delimiter", delimiter);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Listing gs://{}/{}: {}", bucket, prefix, e)))?;

        match response.status() {
            StatusCode::OK => response.json::<ObjectsPage>().await.map_err(|e| {
                StoreError::Unavailable(format!(
                    "Invalid listing response for gs://{}/{}: {}",
                    bucket, prefix, e
                ))
            }),
            StatusCode::NOT_FOUND => Err(StoreError::not_found(bucket, prefix)),
            status => Err(StoreError::Unavailable(format!(
                "Listing gs://{}/{} returned {}",
                bucket, prefix, status
            ))),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> StoreResult<Listing> {
        let mut listing = Listing::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_page(bucket, prefix, delimiter, page_token.as_deref())
                .await?;
            listing.prefixes.extend(page.prefixes);
            listing.objects.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(
            "Listed gs://{}/{}: {} prefixes, {} objects",
            bucket,
            prefix,
            listing.prefixes.len(),
            listing.objects.len()
        );
        Ok(listing)
    }

    async fn read(&self, bucket: &str, object: &str) -> StoreResult<Vec<u8>> {
        let mut url = self.url(&["download", "storage", "v1", "b", bucket, "o", object])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Reading gs://{}/{}: {}", bucket, object, e)))?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(|e| {
                    StoreError::Unavailable(format!(
                        "Failed to read body of gs://{}/{}: {}",
                        bucket, object, e
                    ))
                })?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(StoreError::not_found(bucket, object)),
            status => Err(StoreError::Unavailable(format!(
                "Reading gs://{}/{} returned {}",
                bucket, object, status
            ))),
        }
    }
}
