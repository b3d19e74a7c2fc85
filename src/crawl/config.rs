//! Crawl configuration.
//!
//! Everything the crawler needs to know about the remote tree and the local
//! output is carried by one [`CrawlConfig`] value passed in at construction.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use url::Url;

use super::error::CrawlError;
use crate::download::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::naming::DocumentType;

/// Default remote host.
pub const DEFAULT_HOST: &str = "http://www.etsi.org/";

/// First series group scanned by default.
pub const DEFAULT_FIRST_SERIES_GROUP: u8 = 21;

/// Last series group scanned by default.
pub const DEFAULT_LAST_SERIES_GROUP: u8 = 38;

/// Default number of listing pages fetched in parallel within one level.
pub const DEFAULT_LISTING_CONCURRENCY: usize = 4;

/// Upper bound for listing fan-out.
pub const MAX_LISTING_CONCURRENCY: usize = 32;

/// Series groups are two-digit numbers.
const SERIES_GROUP_RANGE: std::ops::RangeInclusive<u8> = 10..=99;

/// Configuration for one crawl run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Remote host; every listing and file URL is joined onto it.
    pub host: Url,
    /// Document types to crawl, in order.
    pub document_types: Vec<DocumentType>,
    /// Series groups to scan under each type, in order.
    pub series_groups: Vec<u8>,
    /// Directory under which `series_NN` directories are created.
    pub output_root: PathBuf,
    /// Listing pages fetched in parallel within one tree level.
    pub listing_concurrency: usize,
    /// Files transferred in parallel.
    pub transfer_concurrency: usize,
    /// Resolve the tree but transfer nothing and create no directories.
    pub dry_run: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            document_types: DocumentType::ALL.to_vec(),
            series_groups: (DEFAULT_FIRST_SERIES_GROUP..=DEFAULT_LAST_SERIES_GROUP).collect(),
            output_root: PathBuf::from("."),
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
            transfer_concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

impl CrawlConfig {
    /// Checks value ranges and normalizes the host to end with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConcurrency`] for a transfer concurrency
    /// outside 1..=32 and [`CrawlError::InvalidConfig`] for any other bad value.
    pub fn validate(mut self) -> Result<Self, CrawlError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.transfer_concurrency) {
            return Err(CrawlError::InvalidConcurrency {
                value: self.transfer_concurrency,
            });
        }
        if !(1..=MAX_LISTING_CONCURRENCY).contains(&self.listing_concurrency) {
            return Err(CrawlError::invalid_config(format!(
                "listing concurrency {} must be between 1 and {MAX_LISTING_CONCURRENCY}",
                self.listing_concurrency
            )));
        }
        if self.document_types.is_empty() {
            return Err(CrawlError::invalid_config("no document types selected"));
        }
        if self.series_groups.is_empty() {
            return Err(CrawlError::invalid_config("no series groups selected"));
        }
        if let Some(group) = self
            .series_groups
            .iter()
            .find(|&&group| !SERIES_GROUP_RANGE.contains(&group))
        {
            return Err(CrawlError::invalid_config(format!(
                "series group {group} is not a two-digit number"
            )));
        }
        if self.host.cannot_be_a_base() || !matches!(self.host.scheme(), "http" | "https") {
            return Err(CrawlError::invalid_config(format!(
                "host {} is not an http(s) base URL",
                self.host
            )));
        }

        dedup_in_order(&mut self.document_types);
        dedup_in_order(&mut self.series_groups);
        if !self.host.path().ends_with('/') {
            let path = format!("{}/", self.host.path());
            self.host.set_path(&path);
        }
        Ok(self)
    }

    /// Returns the output directory for one series group (`series_21`).
    #[must_use]
    pub fn series_directory(&self, group: u8) -> PathBuf {
        series_directory(&self.output_root, group)
    }
}

/// Returns `root/series_NN`.
#[must_use]
pub fn series_directory(root: &Path, group: u8) -> PathBuf {
    root.join(format!("series_{group}"))
}

/// Drops repeated entries, keeping the first occurrence of each.
fn dedup_in_order<T: Copy + Eq + Hash>(items: &mut Vec<T>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(*item));
}

fn default_host() -> Url {
    // Static literal; parsing cannot fail.
    Url::parse(DEFAULT_HOST).unwrap_or_else(|_| unreachable!())
}

/// Parses a series group list such as `21-38,41`.
///
/// # Errors
///
/// Returns a description of the first malformed or out-of-range entry.
pub fn parse_series_groups(value: &str) -> Result<Vec<u8>, String> {
    let mut groups = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_group(start)?, parse_group(end)?),
            None => {
                let group = parse_group(part)?;
                (group, group)
            }
        };
        if start > end {
            return Err(format!("series range '{part}' is reversed"));
        }
        for group in start..=end {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
    }
    if groups.is_empty() {
        return Err("series list is empty".to_string());
    }
    Ok(groups)
}

fn parse_group(value: &str) -> Result<u8, String> {
    let value = value.trim();
    match value.parse::<u8>() {
        Ok(group) if SERIES_GROUP_RANGE.contains(&group) => Ok(group),
        _ => Err(format!(
            "invalid series group '{value}' (expected a number between 10 and 99)"
        )),
    }
}
