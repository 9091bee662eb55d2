//! Quality issues attached to matches.
//!
//! A network declares the issues its matches may carry; the matcher unions
//! issue sets as it refines a match. Issue sets are immutable: `with` and
//! `merge` return new sets.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Definition of a quality issue a network can raise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDefinition {
    /// Stable issue identifier.
    pub id: String,

    /// Optional concept URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IssueDefinition {
    /// Construct a definition with a validated, non-empty identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, NetworkError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NetworkError::EmptyIdentifier);
        }
        Ok(Self {
            id,
            uri: None,
            description: None,
        })
    }

    /// Attach a concept URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An immutable, ordered set of issue identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issues(BTreeSet<String>);

impl Issues {
    /// The empty issue set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new set with `issue` added.
    #[must_use]
    pub fn with(&self, issue: impl Into<String>) -> Self {
        let mut set = self.0.clone();
        set.insert(issue.into());
        Self(set)
    }

    /// Returns the union of two issue sets.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// Returns true if the set contains `issue`.
    #[must_use]
    pub fn contains(&self, issue: &str) -> bool {
        self.0.contains(issue)
    }

    /// Returns true if no issues are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded issues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over issue identifiers in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for issue in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{issue}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<String> for Issues {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_rejects_empty_id() {
        assert!(IssueDefinition::new("  ").is_err());
        let def = IssueDefinition::new("higher_order_match")
            .unwrap()
            .with_uri("urn:issue:higher_order_match")
            .with_description("Matched above the requested rank");
        assert_eq!(def.id, "higher_order_match");
        assert!(def.uri.is_some());
    }

    #[test]
    fn with_does_not_mutate_original() {
        let empty = Issues::new();
        let one = empty.with("unparsable_name");
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert!(one.contains("unparsable_name"));
    }

    #[test]
    fn merge_is_union() {
        let a = Issues::new().with("a").with("b");
        let b = Issues::new().with("b").with("c");
        let merged = a.merge(&b);
        assert_eq!(merged.len(), 3);
        assert_eq!(a.len(), 2);
        assert_eq!(merged.to_string(), "a, b, c");
    }

    #[test]
    fn serde_round_trip() {
        let issues = Issues::new().with("x").with("y");
        let json = serde_json::to_string(&issues).unwrap();
        let back: Issues = serde_json::from_str(&json).unwrap();
        assert_eq!(issues, back);
    }
}
