use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, instrument};
use url::Url;

use super::{DirectoryListing, ListingFetcher};
use crate::error::TransportError;
use crate::http::{HttpTimeouts, build_http_client};

/// Listing fetcher backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpListingFetcher {
    client: Client,
}

impl HttpListingFetcher {
    /// Creates a fetcher with the default listing timeouts (10s connect, 30s total).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(HttpTimeouts::listing())
    }

    /// Creates a fetcher with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_timeouts(timeouts: HttpTimeouts) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_http_client(timeouts, true)?,
        })
    }
}

#[async_trait]
impl ListingFetcher for HttpListingFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_listing(&self, url: &Url) -> Result<DirectoryListing, TransportError> {
        debug!("fetching listing");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(TransportError::http_status_with_retry_after(
                url.as_str(),
                status.as_u16(),
                retry_after,
            ));
        }

        let markup = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        debug!(bytes = markup.len(), "listing fetched");
        Ok(DirectoryListing::new(url.clone(), markup))
    }
}
