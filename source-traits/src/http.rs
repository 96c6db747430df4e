//! Raw media download capability.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Downloads media bytes (covers, gallery images) from a URL.
///
/// Kept separate from [`ContentSource`](crate::content::ContentSource):
/// media URLs point at CDN hosts that need no signing, so the download pool
/// can use a plain HTTP client while API calls go through the signed path.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the full body at `url`. Implementations should enforce their
    /// own connect/read timeouts; the engine treats any error as one failed
    /// download attempt.
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes>;
}
