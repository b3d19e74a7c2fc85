//! Retrieval engine: size-checked, idempotent file transfers.
//!
//! # Algorithm
//!
//! For each `(remote URL, local destination)` pair:
//!
//! 1. HEAD the URL for `Content-Length`. A failed probe or a missing header
//!    means the expected size is unknown.
//! 2. If the destination exists and its size equals the expected size, the
//!    file is already retrieved: report [`TransferStatus::Skipped`] without
//!    any body transfer. If the sizes differ, delete the local file.
//! 3. Perform exactly one full-body transfer through a `.part` file.
//! 4. Re-measure the destination and report [`TransferStatus::Completed`] or
//!    [`TransferStatus::Failed`] with both sizes.
//!
//! Failures never propagate as errors: every call yields a [`TransferOutcome`].
//!
//! # Concurrency
//!
//! [`RetrievalEngine::retrieve_all`] runs transfers on a bounded pool. Each
//! transfer runs in its own Tokio task holding one semaphore permit; outcomes
//! are returned in request order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::HttpClient;
use super::error::RetrievalError;
use super::rate_limiter::RateLimiter;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 32;

/// Default transfer concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for retrieval engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Final state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// The local file already had the expected size; nothing was transferred.
    Skipped,
    /// The body was transferred and verified.
    Completed,
    /// The transfer failed or the result did not verify.
    Failed,
}

/// Result of one [`RetrievalEngine::retrieve_file`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    /// Full remote URL that was requested.
    pub requested_path: String,
    /// Local destination.
    pub local_path: PathBuf,
    /// Size advertised by the server, `None` when unknown.
    pub expected_size_bytes: Option<u64>,
    /// Size of the destination after the call, `None` when it does not exist.
    pub actual_size_bytes: Option<u64>,
    /// Final state.
    pub status: TransferStatus,
    /// Failure description for `Failed` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferOutcome {
    /// Builds a `Failed` outcome for a transfer that produced no file.
    #[must_use]
    pub fn failed(
        requested_path: impl Into<String>,
        local_path: &Path,
        expected: Option<u64>,
        error: String,
    ) -> Self {
        Self {
            requested_path: requested_path.into(),
            local_path: local_path.to_path_buf(),
            expected_size_bytes: expected,
            actual_size_bytes: None,
            status: TransferStatus::Failed,
            error: Some(error),
        }
    }
}

/// Counts of transfer outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    /// Files already present with the expected size.
    pub skipped: usize,
    /// Files transferred and verified.
    pub completed: usize,
    /// Files that could not be retrieved.
    pub failed: usize,
}

impl TransferStats {
    /// Tallies a batch of outcomes.
    #[must_use]
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a TransferOutcome>) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.record(outcome.status);
        }
        stats
    }

    /// Counts one outcome.
    pub fn record(&mut self, status: TransferStatus) {
        match status {
            TransferStatus::Skipped => self.skipped += 1,
            TransferStatus::Completed => self.completed += 1,
            TransferStatus::Failed => self.failed += 1,
        }
    }

    /// Adds another tally into this one.
    pub fn merge(&mut self, other: Self) {
        self.skipped += other.skipped;
        self.completed += other.completed;
        self.failed += other.failed;
    }

    /// Returns the number of outcomes counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.skipped + self.completed + self.failed
    }
}

/// Size-checked transfer engine with a bounded worker pool.
///
/// Cheap to clone; clones share the semaphore and rate limiter.
#[derive(Debug, Clone)]
pub struct RetrievalEngine {
    client: HttpClient,
    rate_limiter: Arc<RateLimiter>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl RetrievalEngine {
    /// Creates an engine running at most `concurrency` transfers at once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-32).
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use etsi_sync::download::{HttpClient, RateLimiter, RetrievalEngine};
    ///
    /// let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
    /// let engine = RetrievalEngine::new(HttpClient::new().unwrap(), rate_limiter, 4).unwrap();
    /// assert_eq!(engine.concurrency(), 4);
    /// ```
    #[instrument(level = "debug", skip(client, rate_limiter))]
    pub fn new(
        client: HttpClient,
        rate_limiter: Arc<RateLimiter>,
        concurrency: usize,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            rate_limit_ms = rate_limiter.default_delay().as_millis(),
            rate_limit_disabled = rate_limiter.is_disabled(),
            "creating retrieval engine"
        );

        Ok(Self {
            client,
            rate_limiter,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Retrieves one file, returning its outcome.
    #[instrument(skip(self), fields(url = %url, path = %destination.display()))]
    pub async fn retrieve_file(&self, url: &Url, destination: &Path) -> TransferOutcome {
        self.rate_limiter.acquire(url.as_str()).await;
        let expected = match self.client.remote_size(url).await {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "size probe failed, treating remote size as unknown");
                None
            }
        };

        if let Some(expected) = expected {
            match local_size(destination).await {
                Some(actual) if actual == expected => {
                    info!(bytes = actual, "already retrieved, skipping");
                    return TransferOutcome {
                        requested_path: url.to_string(),
                        local_path: destination.to_path_buf(),
                        expected_size_bytes: Some(expected),
                        actual_size_bytes: Some(actual),
                        status: TransferStatus::Skipped,
                        error: None,
                    };
                }
                Some(actual) => {
                    info!(
                        expected_bytes = expected,
                        actual_bytes = actual,
                        "local copy has wrong size, replacing"
                    );
                    if let Err(e) = tokio::fs::remove_file(destination).await {
                        let error = RetrievalError::io(destination, e);
                        warn!(error = %error, "could not delete local copy");
                        return TransferOutcome::failed(
                            url.as_str(),
                            destination,
                            Some(expected),
                            error.to_string(),
                        );
                    }
                }
                None => {}
            }
        }

        self.rate_limiter.acquire(url.as_str()).await;
        let transfer = self.client.download_to_path(url, destination, expected).await;

        let actual = local_size(destination).await;
        let verified = match expected {
            Some(expected) => actual == Some(expected),
            None => actual.is_some(),
        };

        match transfer {
            Ok(bytes) if verified => {
                info!(bytes, "retrieved");
                TransferOutcome {
                    requested_path: url.to_string(),
                    local_path: destination.to_path_buf(),
                    expected_size_bytes: expected,
                    actual_size_bytes: actual,
                    status: TransferStatus::Completed,
                    error: None,
                }
            }
            result => {
                let error = match result {
                    Err(e) => e.to_string(),
                    Ok(_) => format!(
                        "local size {actual:?} does not match expected size {expected:?}"
                    ),
                };
                warn!(
                    expected_bytes = ?expected,
                    actual_bytes = ?actual,
                    error = %error,
                    "retrieval failed"
                );
                TransferOutcome {
                    actual_size_bytes: actual,
                    ..TransferOutcome::failed(url.as_str(), destination, expected, error)
                }
            }
        }
    }

    /// Retrieves every `(url, destination)` pair on the bounded pool.
    ///
    /// Outcomes are returned in the order of `requests`.
    #[instrument(skip_all, fields(count = requests.len()))]
    pub async fn retrieve_all(&self, requests: Vec<(Url, PathBuf)>) -> Vec<TransferOutcome> {
        let mut handles = Vec::with_capacity(requests.len());

        for (url, destination) in requests {
            let engine = self.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let task_url = url.clone();
            let task_destination = destination.clone();
            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TransferOutcome::failed(
                        task_url.as_str(),
                        &task_destination,
                        None,
                        "transfer pool closed".to_string(),
                    );
                };
                engine.retrieve_file(&task_url, &task_destination).await
            });
            handles.push((url, destination, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (url, destination, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(url = %url, error = %e, "transfer task panicked");
                    outcomes.push(TransferOutcome::failed(
                        url.as_str(),
                        &destination,
                        None,
                        format!("transfer task failed: {e}"),
                    ));
                }
            }
        }

        let stats = TransferStats::from_outcomes(&outcomes);
        debug!(
            skipped = stats.skipped,
            completed = stats.completed,
            failed = stats.failed,
            "transfer batch complete"
        );
        outcomes
    }
}

async fn local_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|meta| meta.len())
}
