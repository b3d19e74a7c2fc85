//! Crawl orchestrator: walks the listing tree and drives the retrieval engine.
//!
//! The remote tree has four levels below the host:
//!
//! ```text
//! deliver/etsi_ts/ 121100_121199/ 121101/ 11.01.00_60/ ts_121101v110100p.pdf
//! type             series         document version     file
//! ```
//!
//! Document types are crawled one after another, and series groups within a
//! type one after another. Inside a group, the series listings and then the
//! document listings are fetched with bounded parallelism; results are sets,
//! so sibling order never matters. Once every document of the group is
//! resolved, the group's files are handed to the [`RetrievalEngine`].
//!
//! Failures stay inside their branch. A listing that cannot be fetched after
//! retries, or a document without a version, is recorded in the
//! [`CrawlReport`] and the crawl moves on. The run as a whole fails only
//! when no document type yields any series: either no type listing was
//! reachable ([`CrawlError::HostUnreachable`]) or every reachable listing
//! lacks all configured groups ([`CrawlError::NoSeriesFound`]).

mod config;
mod error;
mod report;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use config::{
    CrawlConfig, DEFAULT_FIRST_SERIES_GROUP, DEFAULT_HOST, DEFAULT_LAST_SERIES_GROUP,
    DEFAULT_LISTING_CONCURRENCY, MAX_LISTING_CONCURRENCY, parse_series_groups, series_directory,
};
pub use error::{BranchError, CrawlError};
pub use report::{
    BranchFailure, CrawlReport, CrawlTotals, GroupReport, GroupStatus, ResolvedFile, TypeReport,
};

use crate::download::{
    FailureType, HttpClient, RateLimiter, RetrievalEngine, RetryDecision, RetryPolicy,
    TransferOutcome, classify_error, parse_retry_after,
};
use crate::error::TransportError;
use crate::listing::{DirectoryListing, HttpListingFetcher, ListingFetcher};
use crate::naming::{DocumentType, derive_file_name};
use crate::segment::{LevelPattern, PathSegment, RegexSegmentExtractor, SegmentExtractor};
use crate::version::resolve_latest_version;

/// Walks the remote tree and mirrors the latest version of every document.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use etsi_sync::crawl::{CrawlConfig, Crawler};
/// use etsi_sync::download::{RateLimiter, RetryPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CrawlConfig {
///     series_groups: vec![21],
///     ..CrawlConfig::default()
/// };
/// let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
/// let crawler = Crawler::new(config, rate_limiter, RetryPolicy::default())?;
/// let report = crawler.run().await?;
/// println!("{} documents resolved", report.totals.resolved);
/// # Ok(())
/// # }
/// ```
pub struct Crawler {
    config: CrawlConfig,
    fetcher: Arc<dyn ListingFetcher>,
    extractor: Arc<dyn SegmentExtractor>,
    engine: RetrievalEngine,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Creates a crawler with the HTTP listing fetcher and regex extractor.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConcurrency`] or
    /// [`CrawlError::InvalidConfig`] for a bad configuration, and
    /// [`CrawlError::Transport`] if an HTTP client cannot be built.
    pub fn new(
        config: CrawlConfig,
        rate_limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
    ) -> Result<Self, CrawlError> {
        let config = config.validate()?;
        let engine = RetrievalEngine::new(
            HttpClient::new()?,
            Arc::clone(&rate_limiter),
            config.transfer_concurrency,
        )?;
        Self::with_components(
            config,
            Arc::new(HttpListingFetcher::new()?),
            Arc::new(RegexSegmentExtractor),
            engine,
            rate_limiter,
            retry_policy,
        )
    }

    /// Creates a crawler from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConcurrency`] or
    /// [`CrawlError::InvalidConfig`] for a bad configuration.
    pub fn with_components(
        config: CrawlConfig,
        fetcher: Arc<dyn ListingFetcher>,
        extractor: Arc<dyn SegmentExtractor>,
        engine: RetrievalEngine,
        rate_limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
    ) -> Result<Self, CrawlError> {
        Ok(Self {
            config: config.validate()?,
            fetcher,
            extractor,
            engine,
            rate_limiter,
            retry_policy,
        })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawls every configured type and series group.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::HostUnreachable`] if no document type listing
    /// could be fetched, [`CrawlError::NoSeriesFound`] if the fetched listings
    /// hold none of the configured series groups, and [`CrawlError::Io`] if
    /// the output root cannot be created. Per-branch and per-file failures are reported in the
    /// returned [`CrawlReport`] instead.
    #[instrument(skip(self), fields(host = %self.config.host, dry_run = self.config.dry_run))]
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        if !self.config.dry_run {
            tokio::fs::create_dir_all(&self.config.output_root)
                .await
                .map_err(|e| CrawlError::io(&self.config.output_root, e))?;
        }

        let mut types = Vec::with_capacity(self.config.document_types.len());
        for &document_type in &self.config.document_types {
            info!(document_type = %document_type, "crawling document type");
            types.push(self.crawl_type(document_type).await);
        }

        if types.iter().all(|report| !report.reached()) {
            let attempted = self
                .config
                .document_types
                .iter()
                .map(|t| self.display_url(t.root_path()))
                .collect();
            return Err(CrawlError::HostUnreachable { attempted });
        }

        let any_series = types
            .iter()
            .flat_map(|report| &report.groups)
            .any(|group| group.status != GroupStatus::SeriesAbsent);
        if !any_series {
            let reached = types
                .iter()
                .filter(|report| report.reached())
                .map(|report| self.display_url(report.document_type.root_path()))
                .collect();
            return Err(CrawlError::NoSeriesFound {
                types: reached,
                series_groups: self.config.series_groups.clone(),
            });
        }

        let report = CrawlReport::new(self.config.dry_run, types);
        let totals = report.totals;
        info!(
            resolved = totals.resolved,
            completed = totals.completed,
            skipped = totals.skipped,
            failed = totals.failed,
            branch_failures = totals.branch_failures,
            series_absent = totals.series_absent,
            "crawl complete"
        );
        Ok(report)
    }

    #[instrument(skip(self), fields(document_type = %document_type))]
    async fn crawl_type(&self, document_type: DocumentType) -> TypeReport {
        let root = document_type.root_segment();
        let listing = match self.fetch_listing(&root).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "document type listing unavailable");
                return TypeReport {
                    document_type,
                    listing_error: Some(e.to_string()),
                    groups: Vec::new(),
                };
            }
        };

        let mut groups = Vec::with_capacity(self.config.series_groups.len());
        for &group in &self.config.series_groups {
            groups.push(
                self.crawl_group(document_type, &root, &listing.raw_markup, group)
                    .await,
            );
        }

        TypeReport {
            document_type,
            listing_error: None,
            groups,
        }
    }

    #[instrument(skip(self, root, type_markup), fields(document_type = %document_type))]
    async fn crawl_group(
        &self,
        document_type: DocumentType,
        root: &PathSegment,
        type_markup: &str,
        series_group: u8,
    ) -> GroupReport {
        let mut failures = Vec::new();

        let series = match self.extractor.extract_child_segments(
            type_markup,
            root,
            &LevelPattern::Series {
                group: series_group,
            },
        ) {
            Ok(series) => series,
            Err(e) => {
                record_failure(&mut failures, root, &BranchError::from(e));
                BTreeSet::new()
            }
        };

        if series.is_empty() && failures.is_empty() {
            info!(series_group, "series absent for this type");
            return GroupReport::absent(series_group);
        }
        debug!(series_group, count = series.len(), "series segments found");

        let documents = self
            .collect_children(&series, &LevelPattern::Document, &mut failures)
            .await;
        if documents.is_empty() {
            info!(series_group, "no documents in series group");
        }

        let mut resolved = self
            .resolve_documents(document_type, &documents, &mut failures)
            .await;
        resolved.sort_by(|a, b| a.document_number.cmp(&b.document_number));
        info!(
            series_group,
            resolved = resolved.len(),
            failures = failures.len(),
            "series group resolved"
        );

        let status = if resolved.is_empty() {
            GroupStatus::NoDocuments
        } else {
            GroupStatus::Resolved
        };

        let transfers = if self.config.dry_run {
            for file in &resolved {
                info!(remote_path = %file.remote_path, file = %file.local_file_name, "would retrieve");
            }
            Vec::new()
        } else {
            self.retrieve_group(series_group, &resolved).await
        };

        GroupReport {
            series_group,
            status,
            series_segments: series.into_iter().collect(),
            resolved,
            branch_failures: failures,
            transfers,
        }
    }

    /// Fetches every parent listing and unions the matching children.
    ///
    /// A series may be split across several listing pages, so children of
    /// all parents are accumulated into one set.
    async fn collect_children(
        &self,
        parents: &BTreeSet<PathSegment>,
        pattern: &LevelPattern,
        failures: &mut Vec<BranchFailure>,
    ) -> BTreeSet<PathSegment> {
        let results: Vec<_> = stream::iter(parents)
            .map(|parent| async move { (parent, self.fetch_children(parent, pattern).await) })
            .buffer_unordered(self.config.listing_concurrency)
            .collect()
            .await;

        let mut children = BTreeSet::new();
        for (parent, result) in results {
            match result {
                Ok(found) => children.extend(found),
                Err(e) => record_failure(failures, parent, &e),
            }
        }
        children
    }

    async fn resolve_documents(
        &self,
        document_type: DocumentType,
        documents: &BTreeSet<PathSegment>,
        failures: &mut Vec<BranchFailure>,
    ) -> Vec<ResolvedFile> {
        let results: Vec<_> = stream::iter(documents)
            .map(|document| async move {
                (document, self.resolve_document(document_type, document).await)
            })
            .buffer_unordered(self.config.listing_concurrency)
            .collect()
            .await;

        let mut resolved = Vec::with_capacity(results.len());
        for (document, result) in results {
            match result {
                Ok(file) => resolved.push(file),
                Err(e) => record_failure(failures, document, &e),
            }
        }
        resolved
    }

    #[instrument(skip(self), fields(document = %document))]
    async fn resolve_document(
        &self,
        document_type: DocumentType,
        document: &PathSegment,
    ) -> Result<ResolvedFile, BranchError> {
        let versions = match self.fetch_children(document, &LevelPattern::Version).await {
            Ok(versions) => versions,
            Err(BranchError::EmptyBranch { .. }) => BTreeSet::new(),
            Err(e) => return Err(e),
        };

        let version = resolve_latest_version(document, &versions)?;
        let document_number = document.last_component().to_string();
        let local_file_name = derive_file_name(document_type, &document_number, &version);
        let remote_path = document.join_file(&format!("{version}/{local_file_name}"));
        debug!(version = %version, file = %local_file_name, "resolved latest version");

        Ok(ResolvedFile {
            document_type,
            document_number,
            version,
            remote_path,
            local_file_name,
        })
    }

    /// Fetches the listing of `parent` and extracts its children.
    ///
    /// An empty result is reported as [`BranchError::EmptyBranch`].
    async fn fetch_children(
        &self,
        parent: &PathSegment,
        pattern: &LevelPattern,
    ) -> Result<BTreeSet<PathSegment>, BranchError> {
        let listing = self.fetch_listing(parent).await?;
        let children = self
            .extractor
            .extract_child_segments(&listing.raw_markup, parent, pattern)?;
        if children.is_empty() {
            return Err(BranchError::EmptyBranch {
                parent: parent.to_string(),
            });
        }
        Ok(children)
    }

    /// Fetches one listing page, retrying transient failures.
    #[instrument(skip(self), fields(segment = %segment))]
    async fn fetch_listing(&self, segment: &PathSegment) -> Result<DirectoryListing, TransportError> {
        let url = self.url_for(segment.as_str())?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.rate_limiter.acquire(url.as_str()).await;

            let error = match self.fetcher.fetch_listing(&url).await {
                Ok(listing) => return Ok(listing),
                Err(e) => e,
            };

            let failure_type = classify_error(&error);
            let retry_after = if failure_type == FailureType::RateLimited {
                self.record_retry_after(&error, &url).await
            } else {
                None
            };

            match self.retry_policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let delay = retry_after.unwrap_or(backoff_delay);
                    info!(
                        url = %url,
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after.is_some(),
                        error = %error,
                        "retrying listing"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %url, %reason, "not retrying listing");
                    return Err(error);
                }
            }
        }
    }

    /// Records a server-mandated delay from a 429 response.
    async fn record_retry_after(
        &self,
        error: &TransportError,
        url: &Url,
    ) -> Option<std::time::Duration> {
        let TransportError::HttpStatus {
            retry_after: Some(header),
            ..
        } = error
        else {
            return None;
        };
        let delay = parse_retry_after(header)?;
        self.rate_limiter.record_rate_limit(url.as_str(), delay).await;
        Some(delay)
    }

    /// Creates the group directory once, then retrieves all its files.
    #[instrument(skip(self, files), fields(count = files.len()))]
    async fn retrieve_group(&self, series_group: u8, files: &[ResolvedFile]) -> Vec<TransferOutcome> {
        if files.is_empty() {
            return Vec::new();
        }

        let directory = self.config.series_directory(series_group);
        if let Err(e) = tokio::fs::create_dir_all(&directory).await {
            warn!(path = %directory.display(), error = %e, "cannot create series directory");
            return files
                .iter()
                .map(|file| {
                    TransferOutcome::failed(
                        self.display_url(&file.remote_path),
                        &directory.join(&file.local_file_name),
                        None,
                        format!("cannot create {}: {e}", directory.display()),
                    )
                })
                .collect();
        }

        let mut requests = Vec::with_capacity(files.len());
        let mut slots = Vec::with_capacity(files.len());
        for file in files {
            let destination = directory.join(&file.local_file_name);
            match self.url_for(&file.remote_path) {
                Ok(url) => {
                    requests.push((url, destination));
                    slots.push(None);
                }
                Err(e) => slots.push(Some(TransferOutcome::failed(
                    self.display_url(&file.remote_path),
                    &destination,
                    None,
                    e.to_string(),
                ))),
            }
        }

        let retrieved = self.engine.retrieve_all(requests).await;
        fill_slots(slots, retrieved)
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.config
            .host
            .join(path)
            .map_err(|_| TransportError::invalid_url(self.display_url(path)))
    }

    fn display_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.host)
    }
}

/// Fills the empty slots with retrieved outcomes, in order.
fn fill_slots(
    slots: Vec<Option<TransferOutcome>>,
    retrieved: Vec<TransferOutcome>,
) -> Vec<TransferOutcome> {
    let mut retrieved = retrieved.into_iter();
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| retrieved.next()))
        .collect()
}

fn record_failure(failures: &mut Vec<BranchFailure>, segment: &PathSegment, error: &BranchError) {
    if error.is_failure() {
        warn!(segment = %segment, error = %error, "branch skipped");
        failures.push(BranchFailure {
            segment: segment.to_string(),
            error: error.to_string(),
        });
    } else {
        debug!(segment = %segment, "empty branch");
    }
}
