//! Segment extraction from directory-listing markup.
//!
//! Listing pages carry no schema: directory entries show up as literal
//! substrings such as `deliver/etsi_ts/121100_121199/` inside `HREF`
//! attributes, mixed with navigation links, sort links and the parent
//! directory. Extraction therefore works on the raw text with a structural
//! pattern per tree level, always anchored on the parent path so that
//! unrelated links are rejected.
//!
//! The crawler talks to the [`SegmentExtractor`] trait only, so the matching
//! strategy can be swapped without touching the crawl logic.
//!
//! # Example
//!
//! ```
//! use etsi_sync::segment::{LevelPattern, PathSegment, RegexSegmentExtractor, SegmentExtractor};
//!
//! let parent = PathSegment::new("deliver/etsi_ts/121100_121199/").unwrap();
//! let markup = r#"<A HREF="/deliver/etsi_ts/121100_121199/121101/">121101</A>"#;
//! let children = RegexSegmentExtractor
//!     .extract_child_segments(markup, &parent, &LevelPattern::Document)
//!     .unwrap();
//! assert_eq!(children.len(), 1);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Path of one directory in the remote tree, relative to the host.
///
/// Always ends with `/`. A child segment always has its parent segment as an
/// exact string prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PathSegment(String);

impl PathSegment {
    /// Wraps a path, returning `None` unless it is non-empty and ends with `/`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Option<Self> {
        let path = path.into();
        (path.len() > 1 && path.ends_with('/')).then_some(Self(path))
    }

    /// Returns the full path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path component without the trailing `/`.
    ///
    /// For `deliver/etsi_ts/121100_121199/121101/` this is `121101`.
    #[must_use]
    pub fn last_component(&self) -> &str {
        let trimmed = self.0.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Returns true if `self` is a strict-prefix extension of `parent`.
    #[must_use]
    pub fn extends(&self, parent: &PathSegment) -> bool {
        self.0.len() > parent.0.len() && self.0.starts_with(&parent.0)
    }

    /// Appends a file name to this directory path.
    #[must_use]
    pub fn join_file(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.0)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expected shape of the next path component at one tree level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelPattern {
    /// A fixed literal component.
    Literal(String),
    /// Series directory for one two-digit group: `1GGnnn_1GGnnn`, e.g. `121100_121199`.
    Series {
        /// Two-digit series-group number.
        group: u8,
    },
    /// Document number directory: 6 to 10 digits.
    Document,
    /// Version directory: `DD.DD.DD_DD`, e.g. `11.01.00_60`.
    Version,
}

impl LevelPattern {
    /// Returns the regular-expression fragment for one path component.
    #[must_use]
    pub fn fragment(&self) -> String {
        match self {
            Self::Literal(literal) => regex::escape(literal.trim_end_matches('/')),
            Self::Series { group } => format!(r"1{group:02}[0-9]{{3}}_1{group:02}[0-9]{{3}}"),
            Self::Document => r"[0-9]{6,10}".to_string(),
            Self::Version => r"[0-9]{2}\.[0-9]{2}\.[0-9]{2}_[0-9]{2}".to_string(),
        }
    }

    /// Builds the full anchored pattern: parent path, one component, trailing `/`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Pattern`] if the regex fails to compile.
    pub fn anchored_regex(&self, parent: &PathSegment) -> Result<Regex, SegmentError> {
        let pattern = format!("{}{}/", regex::escape(parent.as_str()), self.fragment());
        Ok(Regex::new(&pattern)?)
    }
}

/// Errors raised while building an extraction pattern.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The structural pattern did not compile.
    #[error("invalid segment pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Extracts child path segments of one parent from listing markup.
pub trait SegmentExtractor: Send + Sync {
    /// Returns the set of child segments of `parent` matching `pattern`.
    ///
    /// Every returned segment extends `parent`. An empty set means the branch
    /// is empty; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError`] if the pattern cannot be built.
    fn extract_child_segments(
        &self,
        markup: &str,
        parent: &PathSegment,
        pattern: &LevelPattern,
    ) -> Result<BTreeSet<PathSegment>, SegmentError>;
}

/// Regex-over-raw-markup extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSegmentExtractor;

impl SegmentExtractor for RegexSegmentExtractor {
    fn extract_child_segments(
        &self,
        markup: &str,
        parent: &PathSegment,
        pattern: &LevelPattern,
    ) -> Result<BTreeSet<PathSegment>, SegmentError> {
        let regex = pattern.anchored_regex(parent)?;
        Ok(regex
            .find_iter(markup)
            .filter_map(|m| PathSegment::new(m.as_str()))
            .filter(|segment| segment.extends(parent))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seg(path: &str) -> PathSegment {
        PathSegment::new(path).unwrap()
    }

    const TYPE_LISTING: &str = r#"
<html><head><title>www.etsi.org - /deliver/etsi_ts/</title></head><body>
<A HREF="/deliver/">[To Parent Directory]</A><br><br>
 7/28/2023  2:11 PM        &lt;dir&gt; <A HREF="/deliver/etsi_ts/100000_100099/">100000_100099</A><br>
 7/28/2023  2:11 PM        &lt;dir&gt; <A HREF="/deliver/etsi_ts/121100_121199/">121100_121199</A><br>
 7/28/2023  2:11 PM        &lt;dir&gt; <A HREF="/deliver/etsi_ts/121300_121399/">121300_121399</A><br>
 7/28/2023  2:11 PM        &lt;dir&gt; <A HREF="/deliver/etsi_ts/122000_122099/">122000_122099</A><br>
 7/28/2023  2:11 PM        &lt;dir&gt; <A HREF="/deliver/etsi_tr/121900_121999/">121900_121999</A><br>
</body></html>"#;

    #[test]
    fn test_path_segment_requires_trailing_slash() {
        assert!(PathSegment::new("deliver/etsi_ts").is_none());
        assert!(PathSegment::new("/").is_none());
        assert!(PathSegment::new("").is_none());
        assert!(PathSegment::new("deliver/etsi_ts/").is_some());
    }

    #[test]
    fn test_last_component() {
        assert_eq!(
            seg("deliver/etsi_ts/121100_121199/121101/11.01.00_60/").last_component(),
            "11.01.00_60"
        );
        assert_eq!(seg("deliver/").last_component(), "deliver");
    }

    #[test]
    fn test_extends_is_strict() {
        let parent = seg("deliver/etsi_ts/");
        assert!(seg("deliver/etsi_ts/121100_121199/").extends(&parent));
        assert!(!parent.extends(&parent));
        assert!(!seg("deliver/etsi_tr/121100_121199/").extends(&parent));
    }

    #[test]
    fn test_series_pattern_selects_only_requested_group() {
        let parent = seg("deliver/etsi_ts/");
        let found = RegexSegmentExtractor
            .extract_child_segments(TYPE_LISTING, &parent, &LevelPattern::Series { group: 21 })
            .unwrap();

        let expected: BTreeSet<_> = [
            seg("deliver/etsi_ts/121100_121199/"),
            seg("deliver/etsi_ts/121300_121399/"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_series_absent_yields_empty_set() {
        let parent = seg("deliver/etsi_ts/");
        let found = RegexSegmentExtractor
            .extract_child_segments(TYPE_LISTING, &parent, &LevelPattern::Series { group: 30 })
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_other_type_links_are_rejected() {
        // The etsi_tr link for group 21 sits on the same page.
        let parent = seg("deliver/etsi_ts/");
        let found = RegexSegmentExtractor
            .extract_child_segments(TYPE_LISTING, &parent, &LevelPattern::Series { group: 21 })
            .unwrap();
        assert!(found.iter().all(|s| s.as_str().starts_with("deliver/etsi_ts/")));
    }

    #[test]
    fn test_duplicate_entries_collapse() {
        let parent = seg("deliver/etsi_ts/121100_121199/");
        let markup = r#"
<A HREF="/deliver/etsi_ts/121100_121199/121101/">121101</A>
<A HREF="/deliver/etsi_ts/121100_121199/121101/">121101</A>
<A HREF="/deliver/etsi_ts/121100_121199/121111/">121111</A>"#;
        let found = RegexSegmentExtractor
            .extract_child_segments(markup, &parent, &LevelPattern::Document)
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_document_pattern_width_bounds() {
        let parent = seg("deliver/etsi_ts/121100_121199/");
        let markup = "deliver/etsi_ts/121100_121199/12345/ \
                      deliver/etsi_ts/121100_121199/123456/ \
                      deliver/etsi_ts/121100_121199/1234567890/ \
                      deliver/etsi_ts/121100_121199/12345678901/";
        let found = RegexSegmentExtractor
            .extract_child_segments(markup, &parent, &LevelPattern::Document)
            .unwrap();
        let names: Vec<_> = found.iter().map(PathSegment::last_component).collect();
        assert_eq!(names, vec!["123456", "1234567890"]);
    }

    #[test]
    fn test_version_pattern() {
        let parent = seg("deliver/etsi_ts/121100_121199/121101/");
        let markup = r#"
<A HREF="/deliver/etsi_ts/121100_121199/121101/11.00.00_60/">11.00.00_60</A>
<A HREF="/deliver/etsi_ts/121100_121199/121101/11.01.00_60/">11.01.00_60</A>
<A HREF="/deliver/etsi_ts/121100_121199/121101/11.1.00_60/">bad width</A>
<A HREF="/deliver/etsi_ts/121100_121199/121101/latest/">latest</A>"#;
        let found = RegexSegmentExtractor
            .extract_child_segments(markup, &parent, &LevelPattern::Version)
            .unwrap();
        let names: Vec<_> = found.iter().map(PathSegment::last_component).collect();
        assert_eq!(names, vec!["11.00.00_60", "11.01.00_60"]);
    }

    #[test]
    fn test_parent_with_regex_metacharacters_is_escaped() {
        // '.' in the parent must not match arbitrary characters.
        let parent = seg("a.b/");
        let markup = "axb/123456/ a.b/654321/";
        let found = RegexSegmentExtractor
            .extract_child_segments(markup, &parent, &LevelPattern::Document)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.iter().next().unwrap().as_str(), "a.b/654321/");
    }

    #[test]
    fn test_decoys_never_escape_parent() {
        let parent = seg("deliver/etsi_ts/121100_121199/");
        let decoys = [
            "deliver/etsi_ts/121100_121199",
            "deliver/etsi_ts/121100_121199/abc/",
            "deliver/etsi_tr/121100_121199/121101/",
            "xdeliver/etsi_ts/121100_12119/121101/",
            "deliver/etsi_ts/121100_121199/121101",
            "DELIVER/ETSI_TS/121100_121199/121101/",
            "deliver/etsi_ts/121100_121199//121101/",
        ];
        for seed in 0..64usize {
            let mut markup = String::new();
            for (index, decoy) in decoys.iter().enumerate() {
                if (seed >> (index % 6)) & 1 == 1 {
                    markup.push_str("<a href=\"/");
                    markup.push_str(decoy);
                    markup.push_str("\">x</a>");
                }
            }
            markup.push_str("<a href=\"/deliver/etsi_ts/121100_121199/121102/\">ok</a>");
            let found = RegexSegmentExtractor
                .extract_child_segments(&markup, &parent, &LevelPattern::Document)
                .unwrap();
            assert!(found.iter().all(|s| s.extends(&parent)), "seed {seed}: {found:?}");
            assert!(found.contains(&seg("deliver/etsi_ts/121100_121199/121102/")));
        }
    }

    #[test]
    fn test_literal_pattern() {
        let parent = seg("deliver/");
        let found = RegexSegmentExtractor
            .extract_child_segments(
                TYPE_LISTING,
                &parent,
                &LevelPattern::Literal("etsi_ts/".to_string()),
            )
            .unwrap();
        assert!(found.contains(&seg("deliver/etsi_ts/")));
    }
}
