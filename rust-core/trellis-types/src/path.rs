// SPDX-License-Identifier: Apache-2.0
//! Paths and path patterns.
//!
//! An [`ObjectPath`] is a slash-delimited key like `/Instruments/AAPL_C_150`.
//! Paths are opaque to the storage layer; their hierarchy only matters for
//! prefix listing and for [`PathPattern`] matching. A pattern segment `*`
//! matches exactly one path segment; there is no recursive `**` wildcard.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when parsing a path or pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The input string was empty.
    #[error("path must not be empty")]
    Empty,

    /// The input did not start with `/`.
    #[error("path must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    /// The input ended with `/` (only the root path `/` may).
    #[error("path must not end with '/': {0:?}")]
    TrailingSlash(String),

    /// The input contained an empty segment (`//`).
    #[error("path contains an empty segment: {0:?}")]
    EmptySegment(String),

    /// A pattern used the unsupported recursive wildcard `**`.
    #[error("recursive wildcard '**' is not supported: {0:?}")]
    RecursiveWildcard(String),
}

/// Validate the shared shape of paths and patterns, returning the segments.
fn split_segments(raw: &str) -> Result<Vec<&str>, PathError> {
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if !raw.starts_with('/') {
        return Err(PathError::MissingLeadingSlash(raw.to_string()));
    }
    // The root path has no segments.
    if raw == "/" {
        return Ok(Vec::new());
    }
    if raw.ends_with('/') {
        return Err(PathError::TrailingSlash(raw.to_string()));
    }
    let segments: Vec<&str> = raw[1..].split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PathError::EmptySegment(raw.to_string()));
    }
    Ok(segments)
}

/// An immutable, validated storage path.
///
/// Invariants: non-empty, begins with `/`, no trailing `/` except the root
/// path `/`, no empty segments. Ordering is lexicographic on the underlying
/// string, which is also the ordering backends use for listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Parse and validate a path.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, PathError> {
        let raw = raw.as_ref();
        split_segments(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// The root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the root path `/`.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Iterate over the path segments. The root path has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').skip(1).filter(|s| !s.is_empty())
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments().count()
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<ObjectPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(ObjectPath::root()),
            Some(idx) => Some(ObjectPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// True if `self` lies under `prefix` (segment-wise; every path is under
    /// the root).
    pub fn starts_with(&self, prefix: &ObjectPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0)
                && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One segment of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PatternSegment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// Matches any single path segment.
    Any,
}

/// A glob-style path template.
///
/// Follows the same shape rules as [`ObjectPath`]. A `*` segment matches
/// exactly one path segment; all other segments must match literally, and a
/// path only matches when its segment count equals the pattern's. `**` is
/// rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl PathPattern {
    /// Parse and validate a pattern.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, PathError> {
        let raw = raw.as_ref();
        let parts = split_segments(raw)?;
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            if part == "**" {
                return Err(PathError::RecursiveWildcard(raw.to_string()));
            }
            if part == "*" {
                segments.push(PatternSegment::Any);
            } else {
                segments.push(PatternSegment::Literal(part.to_string()));
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of segments in the pattern.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment-by-segment match. Segment counts must be equal; literal
    /// segments must compare exactly.
    pub fn matches(&self, path: &ObjectPath) -> bool {
        let mut count = 0usize;
        for (idx, segment) in path.segments().enumerate() {
            count += 1;
            match self.segments.get(idx) {
                Some(PatternSegment::Any) => {}
                Some(PatternSegment::Literal(lit)) if lit == segment => {}
                _ => return false,
            }
        }
        count == self.segments.len()
    }

    /// The literal leading portion of the pattern, up to the first wildcard.
    ///
    /// Backends use this to narrow a range scan before applying the full
    /// match: every path matching the pattern starts with this string. For
    /// `/Instruments/*` this is `/Instruments/`; for a wildcard-free pattern
    /// it is the entire pattern.
    pub fn literal_prefix(&self) -> String {
        let mut prefix = String::new();
        for segment in &self.segments {
            match segment {
                PatternSegment::Literal(lit) => {
                    prefix.push('/');
                    prefix.push_str(lit);
                }
                PatternSegment::Any => {
                    prefix.push('/');
                    return prefix;
                }
            }
        }
        if prefix.is_empty() {
            prefix.push('/');
        }
        prefix
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathPattern {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for PathPattern {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
