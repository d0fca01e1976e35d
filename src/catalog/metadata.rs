//! Off-chain JSON metadata referenced by collection and item URIs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<serde_json::Value>;
}

/// Fetches metadata documents over HTTP.
pub struct HttpMetadataSource {
    http_client: Client,
    timeout: Duration,
}

impl HttpMetadataSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http_client, timeout })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    #[instrument(skip(self), fields(uri = %uri))]
    async fn fetch(&self, uri: &str) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .get(uri)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to fetch metadata")?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to fetch metadata: {}", response.status()));
        }

        let metadata: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse metadata")?;

        debug!("Fetched metadata from {}", uri);
        Ok(metadata)
    }
}
