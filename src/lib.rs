//! ETSI document mirror library
//!
//! Mirrors the latest version of every ETSI Technical Specification and
//! Technical Report from the `deliver/` directory-listing tree.
//!
//! # Architecture
//!
//! The pipeline runs top-down, leaves first:
//! - [`listing`] - Fetches raw directory-listing markup
//! - [`segment`] - Extracts child path segments with per-level patterns
//! - [`version`] - Selects the latest version of one document
//! - [`naming`] - Derives canonical local file names
//! - [`download`] - Size-checked, idempotent file retrieval
//! - [`crawl`] - Walks the tree and drives retrieval

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crawl;
pub mod download;
pub mod error;
pub mod http;
pub mod listing;
pub mod naming;
pub mod segment;
mod user_agent;
pub mod version;

// Re-export commonly used types
pub use crawl::{CrawlConfig, CrawlError, CrawlReport, Crawler, ResolvedFile};
pub use download::{
    HttpClient, RateLimiter, RetrievalEngine, RetryPolicy, TransferOutcome, TransferStatus,
};
pub use error::TransportError;
pub use listing::{DirectoryListing, HttpListingFetcher, ListingFetcher};
pub use naming::{DocumentType, derive_file_name};
pub use segment::{LevelPattern, PathSegment, RegexSegmentExtractor, SegmentExtractor};
pub use version::{VersionIdentifier, resolve_latest_version};
