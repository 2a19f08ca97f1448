//! Field paths: ordered field-name sequences locating a point in a query or
//! result tree.
//!
//! Paths carry field names only; array indices are elided when result trees
//! are walked. Prefix tests are segment-wise, so `["ab"]` is never mistaken
//! for a descendant of `["a"]` the way dotted-string matching would.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered sequence of field names, fragment spreads already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The empty path, i.e. the operation root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Append one field name.
    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    /// This path followed by `suffix`.
    pub fn join(&self, suffix: &FieldPath) -> FieldPath {
        let mut segments = self.0.clone();
        segments.extend(suffix.0.iter().cloned());
        FieldPath(segments)
    }

    /// Whether `prefix` is a (non-strict) segment-wise prefix of this path.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.starts_with_segments(&prefix.0)
    }

    fn starts_with_segments(&self, prefix: &[String]) -> bool {
        prefix.len() <= self.0.len() && self.0[..prefix.len()] == *prefix
    }

    /// Whether one of the two paths is a prefix of the other, i.e. the
    /// locations sit on the same root-to-leaf line.
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// `overlaps` against a borrowed segment stack, used by result-tree
    /// walkers that track the current location as a `Vec` of names.
    pub fn overlaps_segments(&self, segments: &[String]) -> bool {
        self.starts_with_segments(segments)
            || (segments.len() >= self.0.len() && segments[..self.0.len()] == *self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}
