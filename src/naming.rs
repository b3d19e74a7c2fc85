//! Document types and canonical local file names.
//!
//! ```text
//! deliver/etsi_ts/121100_121199/121101/11.01.00_60/ts_121101v110100p.pdf
//! \__ type ____/ \__ series __/ \_doc/ \_version_/ \____ file name ___/
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::segment::PathSegment;
use crate::version::VersionIdentifier;

/// Revision suffix marking the publication reformatting pass.
///
/// It is part of the version directory name but not of the file name.
const REFORMAT_REVISION_SUFFIX: &str = "_60";

/// Extension of every published document.
const FILE_EXTENSION: &str = "p.pdf";

/// Supported document categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Technical Specification (`deliver/etsi_ts/`).
    Ts,
    /// Technical Report (`deliver/etsi_tr/`).
    Tr,
}

impl DocumentType {
    /// All supported types, in crawl order.
    pub const ALL: [DocumentType; 2] = [DocumentType::Ts, DocumentType::Tr];

    /// Returns the short prefix used in file names (`ts` or `tr`).
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Ts => "ts",
            Self::Tr => "tr",
        }
    }

    /// Returns the top-level tree path for this type.
    #[must_use]
    pub fn root_path(self) -> &'static str {
        match self {
            Self::Ts => "deliver/etsi_ts/",
            Self::Tr => "deliver/etsi_tr/",
        }
    }

    /// Returns the top-level tree path as a segment.
    #[must_use]
    pub fn root_segment(self) -> PathSegment {
        // root_path() is a static non-empty path ending in '/'.
        PathSegment::new(self.root_path()).unwrap_or_else(|| unreachable!())
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ts" | "etsi_ts" => Ok(Self::Ts),
            "tr" | "etsi_tr" => Ok(Self::Tr),
            other => Err(format!("unknown document type '{other}' (expected ts or tr)")),
        }
    }
}

/// Normalizes a version for use in a file name.
///
/// `11.01.00_60` becomes `110100`; other revisions keep their suffix
/// (`11.01.00_50` becomes `110100_50`).
#[must_use]
pub fn normalized_version(version: &VersionIdentifier) -> String {
    let raw = version.as_str();
    let without_reformat = raw.strip_suffix(REFORMAT_REVISION_SUFFIX).unwrap_or(raw);
    without_reformat.replace('.', "")
}

/// Derives the canonical file name for one document revision.
///
/// `(Ts, "121101", 11.01.00_60)` gives `ts_121101v110100p.pdf`.
#[must_use]
pub fn derive_file_name(
    document_type: DocumentType,
    document_number: &str,
    version: &VersionIdentifier,
) -> String {
    format!(
        "{}_{document_number}v{}{FILE_EXTENSION}",
        document_type.prefix(),
        normalized_version(version)
    )
}
