//! Crawl results: resolved files and the run summary.

use serde::Serialize;

use crate::download::{TransferOutcome, TransferStats, TransferStatus};
use crate::naming::DocumentType;
use crate::segment::PathSegment;
use crate::version::VersionIdentifier;

/// Latest revision of one document, ready for retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFile {
    /// Document category.
    pub document_type: DocumentType,
    /// Document number, e.g. `121101`.
    pub document_number: String,
    /// Latest published version.
    pub version: VersionIdentifier,
    /// File path relative to the host, e.g.
    /// `deliver/etsi_ts/121100_121199/121101/11.01.00_60/ts_121101v110100p.pdf`.
    pub remote_path: String,
    /// Canonical local file name, e.g. `ts_121101v110100p.pdf`.
    pub local_file_name: String,
}

/// One branch of the tree that was skipped because of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure {
    /// The segment whose branch was abandoned.
    pub segment: String,
    /// What went wrong.
    pub error: String,
}

/// What a series group yielded under one document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// The type listing holds no series directory for this group.
    SeriesAbsent,
    /// Series directories exist but no document could be resolved.
    NoDocuments,
    /// At least one document was resolved.
    Resolved,
}

/// Results for one series group under one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    /// Two-digit series group.
    pub series_group: u8,
    /// Overall result for the group.
    pub status: GroupStatus,
    /// Series directories found for the group.
    pub series_segments: Vec<PathSegment>,
    /// Documents resolved to their latest version, ordered by number.
    pub resolved: Vec<ResolvedFile>,
    /// Branches abandoned inside the group.
    pub branch_failures: Vec<BranchFailure>,
    /// Transfer outcomes, in the order of `resolved`. Empty on dry runs.
    pub transfers: Vec<TransferOutcome>,
}

impl GroupReport {
    /// A group with no series directory under its type.
    #[must_use]
    pub fn absent(series_group: u8) -> Self {
        Self {
            series_group,
            status: GroupStatus::SeriesAbsent,
            series_segments: Vec::new(),
            resolved: Vec::new(),
            branch_failures: Vec::new(),
            transfers: Vec::new(),
        }
    }
}

/// Results for one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeReport {
    /// Document category.
    pub document_type: DocumentType,
    /// Set when the top-level listing could not be fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
    /// Per-group results, in configured order.
    pub groups: Vec<GroupReport>,
}

impl TypeReport {
    /// Returns true when the top-level listing was fetched.
    #[must_use]
    pub fn reached(&self) -> bool {
        self.listing_error.is_none()
    }
}

/// Aggregate counts over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlTotals {
    /// Documents resolved to a latest version.
    pub resolved: usize,
    /// Files transferred and verified.
    pub completed: usize,
    /// Files already present.
    pub skipped: usize,
    /// Files that could not be retrieved.
    pub failed: usize,
    /// Branches abandoned (listing failures, documents without versions).
    pub branch_failures: usize,
    /// Type and group combinations with no series directory.
    pub series_absent: usize,
}

/// Summary of one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Whether transfers were suppressed.
    pub dry_run: bool,
    /// Per-type results, in configured order.
    pub types: Vec<TypeReport>,
    /// Aggregate counts.
    pub totals: CrawlTotals,
}

impl CrawlReport {
    /// Builds a report and computes its totals.
    #[must_use]
    pub fn new(dry_run: bool, types: Vec<TypeReport>) -> Self {
        let mut totals = CrawlTotals::default();
        let mut transfers = TransferStats::default();

        for report in &types {
            if !report.reached() {
                totals.branch_failures += 1;
            }
            for group in &report.groups {
                totals.resolved += group.resolved.len();
                totals.branch_failures += group.branch_failures.len();
                if group.status == GroupStatus::SeriesAbsent {
                    totals.series_absent += 1;
                }
                transfers.merge(TransferStats::from_outcomes(&group.transfers));
            }
        }

        totals.completed = transfers.completed;
        totals.skipped = transfers.skipped;
        totals.failed = transfers.failed;

        Self {
            dry_run,
            types,
            totals,
        }
    }

    /// Returns true if any file or branch failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0 || self.totals.branch_failures > 0
    }

    /// Iterates over every resolved file in report order.
    pub fn resolved_files(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.types
            .iter()
            .flat_map(|t| &t.groups)
            .flat_map(|g| &g.resolved)
    }

    /// Iterates over every transfer outcome with the given status.
    pub fn transfers_with_status(
        &self,
        status: TransferStatus,
    ) -> impl Iterator<Item = &TransferOutcome> {
        self.types
            .iter()
            .flat_map(|t| &t.groups)
            .flat_map(|g| &g.transfers)
            .filter(move |outcome| outcome.status == status)
    }
}
