//! Listing fetcher: retrieves the raw markup of one directory-listing page.
//!
//! The remote repository exposes its tree only as auto-generated HTML index
//! pages. This module performs the blocking-per-call full-body GET for one
//! such page and hands the markup to the segment extractor untouched.
//!
//! - [`ListingFetcher`] - Async trait the crawler depends on
//! - [`HttpListingFetcher`] - reqwest-backed implementation
//! - [`DirectoryListing`] - Ephemeral page markup plus its source URL
//!
//! No retry happens here. Retry policy belongs to the crawler, which decides
//! per tree level whether a failure is retried or degrades the subtree to
//! empty.

mod fetcher;

pub use fetcher::HttpListingFetcher;

use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;

/// Raw markup of one directory-listing page.
///
/// Produced by a [`ListingFetcher`], consumed immediately by the segment
/// extractor, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    /// URL the markup was fetched from.
    pub source_url: Url,
    /// Response body decoded as text.
    pub raw_markup: String,
}

impl DirectoryListing {
    /// Creates a listing from a URL and its markup.
    #[must_use]
    pub fn new(source_url: Url, raw_markup: impl Into<String>) -> Self {
        Self {
            source_url,
            raw_markup: raw_markup.into(),
        }
    }
}

/// Retrieves directory-listing pages.
///
/// Implementations must be cheap to share across concurrent tasks; the
/// crawler holds one behind an `Arc` and fans out sibling fetches.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    /// Fetches the full body of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection failure, timeout, or a
    /// non-2xx status.
    async fn fetch_listing(&self, url: &Url) -> Result<DirectoryListing, TransportError>;
}
