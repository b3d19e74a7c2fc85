//! Version identifiers and latest-version selection.
//!
//! Published revisions live in directories named `MAJOR.MINOR.PATCH_REV`,
//! each field zero-padded to two digits (`11.01.00_60`). With a fixed field
//! width, lexical order of the directory names equals numeric order of the
//! fields. Selection compares the parsed numeric fields, so identifiers of
//! any uniform width order correctly. An identifier whose fields differ in
//! width (`100.00.00_60`) is malformed and ignored during selection; the
//! segment extractor only admits the two-digit shape in the first place.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::segment::PathSegment;

/// Field width observed on the remote tree.
pub const VERSION_FIELD_WIDTH: usize = 2;

/// Errors from version parsing and selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The string is not shaped like `MAJOR.MINOR.PATCH_REV`.
    #[error("malformed version identifier: {value}")]
    Malformed {
        /// The rejected input.
        value: String,
    },

    /// A document directory holds no version directory.
    #[error("no version found under {document}")]
    NoVersionFound {
        /// The document segment that was searched.
        document: String,
    },
}

/// One published revision: `MAJOR.MINOR.PATCH_REV`.
///
/// The original text is kept so file names reproduce the remote padding
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionIdentifier {
    fields: [u32; 4],
    raw: String,
}

impl VersionIdentifier {
    /// Parses `MAJOR.MINOR.PATCH_REV`.
    ///
    /// Fields must be non-empty ASCII digit runs of one common width. The
    /// width is not fixed to two, but mixed widths are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Malformed`] for any other shape.
    pub fn parse(value: &str) -> Result<Self, VersionError> {
        let malformed = || VersionError::Malformed {
            value: value.to_string(),
        };

        let (dotted, revision) = value.split_once('_').ok_or_else(malformed)?;
        let mut parts = dotted.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let raw_fields = [major, minor, patch, revision];
        let width = major.len();
        let mut fields = [0u32; 4];
        for (slot, field) in fields.iter_mut().zip(raw_fields) {
            if field.is_empty()
                || field.len() != width
                || !field.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(malformed());
            }
            *slot = field.parse().map_err(|_| malformed())?;
        }

        Ok(Self {
            fields,
            raw: value.to_string(),
        })
    }

    /// Parses the version from the last component of a version directory.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Malformed`] if the component is not a version.
    pub fn from_segment(segment: &PathSegment) -> Result<Self, VersionError> {
        Self::parse(segment.last_component())
    }

    /// Returns the identifier exactly as published.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `(major, minor, patch, revision)`.
    #[must_use]
    pub fn fields(&self) -> (u32, u32, u32, u32) {
        let [major, minor, patch, revision] = self.fields;
        (major, minor, patch, revision)
    }

    /// Returns the per-field digit width.
    #[must_use]
    pub fn field_width(&self) -> usize {
        self.raw.split('.').next().map_or(0, str::len)
    }
}

impl Ord for VersionIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fields
            .cmp(&other.fields)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for VersionIdentifier {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Selects the latest version among sibling version directories of one document.
///
/// Segments whose last component is not a version are ignored.
///
/// # Errors
///
/// Returns [`VersionError::NoVersionFound`] if no segment parses as a version.
pub fn resolve_latest_version<'a, I>(
    document: &PathSegment,
    version_segments: I,
) -> Result<VersionIdentifier, VersionError>
where
    I: IntoIterator<Item = &'a PathSegment>,
{
    version_segments
        .into_iter()
        .filter(|segment| segment.extends(document))
        .filter_map(|segment| VersionIdentifier::from_segment(segment).ok())
        .max()
        .ok_or_else(|| VersionError::NoVersionFound {
            document: document.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seg(path: &str) -> PathSegment {
        PathSegment::new(path).unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let version = VersionIdentifier::parse("11.01.00_60").unwrap();
        assert_eq!(version.fields(), (11, 1, 0, 60));
        assert_eq!(version.as_str(), "11.01.00_60");
        assert_eq!(version.field_width(), VERSION_FIELD_WIDTH);
    }

    #[test]
    fn test_mixed_width_version_is_ignored_by_selection() {
        assert!(VersionIdentifier::parse("100.00.00_60").is_err());
        let document = seg("deliver/etsi_ts/121100_121199/121101/");
        let versions = [
            seg("deliver/etsi_ts/121100_121199/121101/11.01.00_60/"),
            seg("deliver/etsi_ts/121100_121199/121101/100.00.00_60/"),
        ];
        let latest = resolve_latest_version(&document, &versions).unwrap();
        assert_eq!(latest.as_str(), "11.01.00_60");
    }

    #[test]
    fn test_uniform_wider_version_orders_numerically() {
        let wide = VersionIdentifier::parse("100.000.000_060").unwrap();
        let narrow = VersionIdentifier::parse("99.99.99_99").unwrap();
        assert_eq!(wide.field_width(), 3);
        assert!(wide > narrow);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "11.01.00", "11.01_60", "11.01.00.00_60", "11.1.00_60", "aa.bb.cc_dd",
            "11.01.00_", "11.01.00_6", "+1.01.00_60",
        ] {
            assert!(
                matches!(VersionIdentifier::parse(bad), Err(VersionError::Malformed { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_latest_picks_highest() {
        let document = seg("deliver/etsi_ts/121100_121199/121101/");
        let versions = [
            seg("deliver/etsi_ts/121100_121199/121101/11.00.00_60/"),
            seg("deliver/etsi_ts/121100_121199/121101/11.01.00_60/"),
        ];
        let latest = resolve_latest_version(&document, &versions).unwrap();
        assert_eq!(latest.as_str(), "11.01.00_60");
    }

    #[test]
    fn test_resolve_latest_across_major_versions() {
        let document = seg("d/123456/");
        let versions = [
            seg("d/123456/09.05.00_60/"),
            seg("d/123456/17.00.00_60/"),
            seg("d/123456/16.09.02_60/"),
        ];
        let latest = resolve_latest_version(&document, &versions).unwrap();
        assert_eq!(latest.fields(), (17, 0, 0, 60));
    }

    #[test]
    fn test_resolve_latest_empty_is_no_version_found() {
        let document = seg("d/123456/");
        let result = resolve_latest_version(&document, std::iter::empty());
        assert_eq!(
            result,
            Err(VersionError::NoVersionFound {
                document: "d/123456/".to_string()
            })
        );
    }

    #[test]
    fn test_resolve_latest_ignores_foreign_segments() {
        let document = seg("d/123456/");
        let versions = [seg("d/654321/99.00.00_60/"), seg("d/123456/01.00.00_60/")];
        let latest = resolve_latest_version(&document, &versions).unwrap();
        assert_eq!(latest.as_str(), "01.00.00_60");
    }

    #[test]
    fn test_wider_fields_still_order_numerically() {
        // Lexically "100.00.00_60" < "99.00.00_60"; numerically it is larger.
        let wide = VersionIdentifier::parse("100.000.000_060").unwrap();
        let narrow = VersionIdentifier::parse("99.00.00_60").unwrap();
        assert!(wide > narrow);
    }

    #[test]
    fn test_lexical_order_matches_numeric_for_fixed_width() {
        let values: Vec<u32> = vec![0, 1, 2, 9, 10, 11, 19, 50, 60, 98, 99];
        let mut identifiers = Vec::new();
        for &major in &values {
            for &minor in &[0u32, 1, 10, 99] {
                for &patch in &[0u32, 9, 10] {
                    for &revision in &[50u32, 60] {
                        identifiers.push(format!(
                            "{major:02}.{minor:02}.{patch:02}_{revision:02}"
                        ));
                    }
                }
            }
        }

        for a in &identifiers {
            for b in &identifiers {
                let lexical = a.cmp(b);
                let numeric = VersionIdentifier::parse(a)
                    .unwrap()
                    .cmp(&VersionIdentifier::parse(b).unwrap());
                assert_eq!(lexical, numeric, "{a} vs {b}");
            }
        }
    }
}
