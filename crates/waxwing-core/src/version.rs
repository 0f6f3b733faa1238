use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::VersionError;

pub const SEGMENT_DELIMITER: char = '.';

/// Application version made of dot-separated non-negative integers.
///
/// Comparison is numeric per segment and missing trailing segments count
/// as zero, so `1.9 < 1.10` and `1.0 == 1`. The original text is kept for
/// display and for writing back to the completion store.
#[derive(Clone, Debug)]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let segments = s
            .split(SEGMENT_DELIMITER)
            .map(|segment| parse_segment(s, segment))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { raw: s.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Segments with trailing zeros dropped; equal versions share this form.
    fn significant(&self) -> &[u64] {
        let len = self.segments.iter().rposition(|s| *s != 0).map_or(0, |i| i + 1);
        &self.segments[..len]
    }
}

fn parse_segment(version: &str, segment: &str) -> Result<u64, VersionError> {
    // u64::from_str accepts a leading '+', which is not a valid segment.
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidSegment {
            version: version.to_string(),
            segment: segment.to_string(),
        });
    }
    segment.parse::<u64>().map_err(|_| VersionError::SegmentOverflow {
        version: version.to_string(),
        segment: segment.to_string(),
    })
}

/// Compare two version strings numerically.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn numeric_not_lexical() {
        assert_eq!(compare("1.9", "1.10").unwrap(), Ordering::Less);
        assert_eq!(compare("2", "10").unwrap(), Ordering::Less);
        assert_eq!(compare("1.10.2", "1.10.1").unwrap(), Ordering::Greater);
    }

    #[test]
    fn missing_segments_are_zero() {
        assert_eq!(compare("1.0", "1").unwrap(), Ordering::Equal);
        assert_eq!(compare("1", "1.0.0.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.0.1", "1").unwrap(), Ordering::Greater);
    }

    #[test]
    fn leading_zeros_compare_by_value() {
        assert_eq!(v("1.01"), v("1.1"));
    }

    #[test]
    fn equal_versions_hash_equal() {
        let set: HashSet<Version> = ["1", "1.0", "1.0.0"].into_iter().map(v).collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_keeps_original_text() {
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(v("1.0.0").segments(), &[1, 0, 0]);
    }

    #[test]
    fn rejects_malformed_versions() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        for bad in ["1..2", "1.a", "+1", "1.-2", " 1", "1.", "v1.0"] {
            assert!(
                matches!(Version::parse(bad), Err(VersionError::InvalidSegment { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(
            Version::parse("1.99999999999999999999"),
            Err(VersionError::SegmentOverflow { .. })
        ));
    }

    #[test]
    fn compare_reports_the_bad_side() {
        let err = compare("1.0", "1.x").unwrap_err();
        assert_eq!(
            err,
            VersionError::InvalidSegment { version: "1.x".into(), segment: "x".into() }
        );
    }
}
