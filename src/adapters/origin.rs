//! HTTP Origin Adapter
//!
//! Implements the [`Fetcher`] port against an HTTP origin that serves one JSON
//! document per key at `{base_url}/{key}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::Fetcher;
use crate::error::{Error, Result};

/// Default request timeout for origin fetches.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP origin configuration
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Base URL; keys are appended as a URL-encoded path segment
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl OriginConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_ORIGIN_TIMEOUT,
        }
    }
}

/// Fetches JSON values from an HTTP origin.
pub struct HttpOrigin {
    config: OriginConfig,
    client: Client,
}

impl HttpOrigin {
    /// Create a new origin client
    pub fn new(config: OriginConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// URL the value for `key` is fetched from
    pub fn url_for(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(key)
        )
    }

    pub fn config(&self) -> &OriginConfig {
        &self.config
    }
}

impl std::fmt::Debug for HttpOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrigin")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[async_trait]
impl Fetcher<Value> for HttpOrigin {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> Result<Value> {
        let url = self.url_for(key);
        debug!("Fetching from origin: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Error::Origin)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::OriginStatus {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| Error::Fetch {
            key: key.to_string(),
            reason: format!("invalid JSON body: {}", e),
        })
    }
}
