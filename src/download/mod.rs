//! Retrieval engine for resolved documents.
//!
//! This module turns a resolved remote URL and a local destination into a
//! verified local file.
//!
//! # Features
//!
//! - HEAD probe for the authoritative `Content-Length`
//! - Skip when the local copy already has that size, delete it otherwise
//! - Streaming transfer into a `.part` file, renamed only after verification
//! - Bounded worker pool with per-host request spacing
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use etsi_sync::download::{HttpClient, RateLimiter, RetrievalEngine, TransferStatus};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
//! let engine = RetrievalEngine::new(HttpClient::new()?, rate_limiter, 4)?;
//! let url = Url::parse("http://www.etsi.org/deliver/etsi_ts/121100_121199/121101/11.01.00_60/ts_121101v110100p.pdf")?;
//! let outcome = engine
//!     .retrieve_file(&url, Path::new("series_21/ts_121101v110100p.pdf"))
//!     .await;
//! assert_ne!(outcome.status, TransferStatus::Failed);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
pub mod rate_limiter;
mod retry;

pub use client::{HttpClient, part_path_for};
pub use engine::{
    DEFAULT_CONCURRENCY, EngineError, MAX_CONCURRENCY, MIN_CONCURRENCY, RetrievalEngine,
    TransferOutcome, TransferStats, TransferStatus,
};
pub use error::RetrievalError;
pub use rate_limiter::{RateLimiter, extract_host, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
