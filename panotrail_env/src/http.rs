//! HTTP implementation of ImageFetcher using reqwest.

use crate::error::FetchError;
use crate::fetch::ImageFetcher;
use async_trait::async_trait;
use tracing::warn;

/// Fetches image bytes over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a default client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Image fetch transport error for {}: {}", url, e);
            FetchError::transport(url, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Image fetch for {} returned {}", url, status);
            return Err(FetchError::status(url, status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            warn!("Image body read failed for {}: {}", url, e);
            FetchError::transport(url, e)
        })?;

        Ok(body.to_vec())
    }
}
