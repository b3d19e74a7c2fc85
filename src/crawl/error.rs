//! Error types for the crawl orchestrator.
//!
//! [`BranchError`] is contained to one branch of the tree (one type listing,
//! one series listing, one document) and recorded in the report.
//! [`CrawlError`] ends the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::EngineError;
use crate::error::TransportError;
use crate::segment::SegmentError;
use crate::version::VersionError;

/// Failure of one branch of the tree. Never aborts sibling branches.
#[derive(Debug, Error)]
pub enum BranchError {
    /// The listing for this branch could not be fetched (after retries).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The level yielded no matching segments. A legitimate terminal state.
    #[error("no matching entries under {parent}")]
    EmptyBranch {
        /// The parent segment whose listing was empty.
        parent: String,
    },

    /// A document directory holds no version directory.
    #[error("no version found under {document}")]
    NoVersionFound {
        /// The document segment that was searched.
        document: String,
    },

    /// The structural pattern for this level could not be built.
    #[error(transparent)]
    Pattern(#[from] SegmentError),
}

impl BranchError {
    /// Returns false for [`BranchError::EmptyBranch`], which is not a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::EmptyBranch { .. })
    }
}

impl From<VersionError> for BranchError {
    fn from(error: VersionError) -> Self {
        match error {
            VersionError::NoVersionFound { document } => Self::NoVersionFound { document },
            VersionError::Malformed { value } => Self::NoVersionFound { document: value },
        }
    }
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Not a single document type's top-level listing could be fetched.
    #[error("remote host unreachable: no top-level listing could be fetched ({})", .attempted.join(", "))]
    HostUnreachable {
        /// The top-level listing URLs that were tried.
        attempted: Vec<String>,
    },

    /// Listings were fetched but no type holds any configured series group.
    #[error(
        "no series found: none of the groups {series_groups:?} appears under {}",
        .types.join(", ")
    )]
    NoSeriesFound {
        /// Document types whose top-level listing was fetched.
        types: Vec<String>,
        /// Series groups that were looked for.
        series_groups: Vec<u8>,
    },

    /// The output root could not be prepared.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Transfer concurrency outside 1..=32.
    #[error("invalid concurrency value {value}: must be between 1 and 32")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Any other invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// An HTTP client could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<EngineError> for CrawlError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::InvalidConcurrency { value } => Self::InvalidConcurrency { value },
        }
    }
}

impl CrawlError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
