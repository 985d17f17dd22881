//! Image byte transport abstraction.

use async_trait::async_trait;
use crate::error::FetchError;

/// Retrieves raw image bytes by URL.
///
/// # Contract
///
/// - A non-success response is `FetchError::Status` carrying the URL
/// - A transport failure is `FetchError::Transport` carrying the URL
/// - No retries; retry policy belongs to the caller
#[async_trait]
pub trait ImageFetcher: Send + Sync + 'static {
    /// Fetches the full body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
