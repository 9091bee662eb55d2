//! Observables and their attached behaviors.
//!
//! An observable is a named, typed evidence slot in the network graph.
//! Derivations, normalizers, conditions and modifiers are closed enums with
//! exhaustive dispatch; each variant carries only the data it needs.

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classification::Classification;
use crate::error::NetworkError;
use crate::value::Value;

/// Declared value type of an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservableType {
    /// Free-form or controlled string.
    String,

    /// Integer value.
    Integer,

    /// Floating-point value.
    Number,

    /// Boolean value.
    Boolean,
}

impl Default for ObservableType {
    fn default() -> Self {
        Self::String
    }
}

/// How an observable participates in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// Opaque identifier; compared exactly.
    Identifier,

    /// Canonical form; compared after normalization.
    Canonical,

    /// Free-text phrase; compared as an unordered word set.
    Phrase,
}

impl Default for Style {
    fn default() -> Self {
        Self::Canonical
    }
}

/// String normalization applied before evidence comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Normalizer {
    /// Lower-case the value.
    LowerCase,

    /// Trim and collapse internal whitespace runs to single spaces.
    CollapseWhitespace,

    /// Regex replacement.
    Pattern {
        /// Pattern to search for.
        pattern: String,
        /// Replacement text.
        replace: String,
    },
}

impl Normalizer {
    /// Validate that the normalizer is well-formed (patterns compile).
    pub fn validate(&self) -> Result<(), NetworkError> {
        if let Self::Pattern { pattern, .. } = self {
            Regex::new(pattern).map_err(|e| NetworkError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Apply the normalization to a string.
    pub fn apply(&self, value: &str) -> Result<String, NetworkError> {
        match self {
            Self::LowerCase => Ok(value.to_lowercase()),
            Self::CollapseWhitespace => {
                Ok(value.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Self::Pattern { pattern, replace } => {
                let re = Regex::new(pattern).map_err(|e| NetworkError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(re.replace_all(value, replace.as_str()).into_owned())
            }
        }
    }
}

/// How an observable's value is computed from other observables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Derivation {
    /// Copy another observable's value.
    Copy {
        /// Source observable key.
        source: String,
    },

    /// Concatenate string values of several observables.
    Concat {
        /// Source observable keys, in order.
        sources: Vec<String>,
        /// Separator inserted between present values.
        separator: String,
    },

    /// Copy a source value, falling back to a default when absent.
    Default {
        /// Source observable key.
        source: String,
        /// Fallback value.
        default: Value,
    },
}

impl Derivation {
    /// Observable keys this derivation reads from.
    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        match self {
            Self::Copy { source } | Self::Default { source, .. } => vec![source.as_str()],
            Self::Concat { sources, .. } => sources.iter().map(String::as_str).collect(),
        }
    }

    /// Compute the derived value against a classification.
    ///
    /// Returns `None` when the derivation has nothing to produce (all
    /// sources absent, or a non-string value in a concatenation).
    #[must_use]
    pub fn derive(&self, classification: &Classification) -> Option<Value> {
        match self {
            Self::Copy { source } => classification.get(source).cloned(),
            Self::Default { source, default } => Some(
                classification
                    .get(source)
                    .cloned()
                    .unwrap_or_else(|| default.clone()),
            ),
            Self::Concat { sources, separator } => {
                let mut parts: Vec<&str> = Vec::with_capacity(sources.len());
                for source in sources {
                    match classification.get(source) {
                        Some(Value::String(s)) if !s.is_empty() => parts.push(s),
                        Some(_) => return None,
                        None => return None,
                    }
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(Value::String(parts.join(separator)))
                }
            }
        }
    }
}

/// A predicate over a classification, used to gate modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Condition {
    /// The observable has a value.
    Present {
        /// Observable key.
        observable: String,
    },

    /// The observable has no value.
    Absent {
        /// Observable key.
        observable: String,
    },

    /// The observable has exactly this value.
    Equals {
        /// Observable key.
        observable: String,
        /// Expected value.
        value: Value,
    },
}

impl Condition {
    /// Evaluate the condition against a classification.
    #[must_use]
    pub fn holds(&self, classification: &Classification) -> bool {
        match self {
            Self::Present { observable } => classification.has(observable),
            Self::Absent { observable } => !classification.has(observable),
            Self::Equals { observable, value } => {
                classification.get(observable) == Some(value)
            }
        }
    }
}

/// What a modifier does to a classification copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ModifierAction {
    /// Remove values from the named observables.
    Erase {
        /// Observable keys to clear.
        observables: Vec<String>,
    },

    /// Overwrite one observable with a fixed value.
    Substitute {
        /// Observable key to set.
        observable: String,
        /// Replacement value.
        value: Value,
    },
}

/// A declared alteration of a classification used to widen a search.
///
/// Modifiers never mutate in place; [`Modifier::apply`] returns a new
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    /// Stable modifier identifier.
    pub id: String,

    /// Optional gate; an ungated modifier always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    /// The alteration to perform.
    pub action: ModifierAction,
}

impl Modifier {
    /// Construct a modifier with a validated identifier.
    pub fn new(id: impl Into<String>, action: ModifierAction) -> Result<Self, NetworkError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NetworkError::EmptyIdentifier);
        }
        Ok(Self {
            id,
            condition: None,
            action,
        })
    }

    /// Gate the modifier on a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Returns true if the modifier applies to this classification.
    #[must_use]
    pub fn applies(&self, classification: &Classification) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |c| c.holds(classification))
    }

    /// Apply the modifier, returning an altered copy.
    ///
    /// Unknown observable keys are ignored; a modifier widens a search, it
    /// never invalidates one.
    #[must_use]
    pub fn apply(&self, classification: &Classification) -> Classification {
        let mut altered = classification.clone();
        match &self.action {
            ModifierAction::Erase { observables } => {
                for key in observables {
                    let _ = altered.clear(key);
                }
            }
            ModifierAction::Substitute { observable, value } => {
                let _ = altered.set(observable, value.clone());
            }
        }
        altered
    }
}

/// A named, typed evidence slot in the network graph.
///
/// Identity is by URI when present, else by identifier. Observables are
/// immutable once constructed and owned by their network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observable {
    /// Stable identifier.
    pub id: String,

    /// Optional concept URI; takes precedence for identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Declared value type.
    #[serde(default)]
    pub observable_type: ObservableType,

    /// Matching style.
    #[serde(default)]
    pub style: Style,

    /// Optional normalizer applied before comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalizer: Option<Normalizer>,

    /// Optional derivation from other observables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,

    /// Whether a query must populate this observable.
    #[serde(default)]
    pub required: bool,

    /// Optional erasure-group tag; group members can be omitted together.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Observable {
    /// Construct an observable with a validated identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, NetworkError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NetworkError::EmptyIdentifier);
        }
        Ok(Self {
            id,
            uri: None,
            observable_type: ObservableType::default(),
            style: Style::default(),
            normalizer: None,
            derivation: None,
            required: false,
            group: None,
        })
    }

    /// Attach a concept URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the declared value type.
    #[must_use]
    pub const fn with_type(mut self, observable_type: ObservableType) -> Self {
        self.observable_type = observable_type;
        self
    }

    /// Set the matching style.
    #[must_use]
    pub const fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Attach a normalizer.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Attach a derivation.
    #[must_use]
    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.derivation = Some(derivation);
        self
    }

    /// Mark the observable as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Tag the observable with an erasure group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Identity key: URI if present, else identifier.
    #[must_use]
    pub fn key(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.id)
    }

    /// Returns true if this observable is derived from others.
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        self.derivation.is_some()
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Observable {}

impl Hash for Observable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// An (observable, expected-truth-value) pair.
///
/// Contributors build postulate and condition lists: "this evidence is
/// present and true" or "present and false."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contributor {
    /// Observable identity key.
    pub observable: String,

    /// Expected truth value.
    pub value: bool,
}

impl Contributor {
    /// Construct a contributor.
    #[must_use]
    pub fn new(observable: impl Into<String>, value: bool) -> Self {
        Self {
            observable: observable.into(),
            value,
        }
    }

    /// Returns true if both refer to the same observable with opposite
    /// truth values.
    #[must_use]
    pub fn contradicts(&self, other: &Self) -> bool {
        self.observable == other.observable && self.value != other.value
    }

    /// Single-character sign trace: `t` or `f`.
    #[must_use]
    pub const fn sign(&self) -> char {
        if self.value {
            't'
        } else {
            'f'
        }
    }
}

impl fmt::Display for Contributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.observable, if self.value { 'T' } else { 'F' })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_uri() {
        let a = Observable::new("genus").unwrap().with_uri("urn:tax:genus");
        let b = Observable::new("genusName").unwrap().with_uri("urn:tax:genus");
        let c = Observable::new("genus").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.key(), "urn:tax:genus");
        assert_eq!(c.key(), "genus");
    }

    #[test]
    fn empty_identifier_rejected() {
        assert!(Observable::new(" ").is_err());
    }

    #[test]
    fn normalizers_apply() {
        assert_eq!(Normalizer::LowerCase.apply("Acacia").unwrap(), "acacia");
        assert_eq!(
            Normalizer::CollapseWhitespace
                .apply("  Acacia   dealbata ")
                .unwrap(),
            "Acacia dealbata"
        );
        let strip = Normalizer::Pattern {
            pattern: r"[^\w\s]".to_string(),
            replace: String::new(),
        };
        assert_eq!(strip.apply("Acacia? dealbata!").unwrap(), "Acacia dealbata");
    }

    #[test]
    fn invalid_pattern_rejected() {
        let bad = Normalizer::Pattern {
            pattern: "(".to_string(),
            replace: String::new(),
        };
        assert!(bad.validate().is_err());
        assert!(bad.apply("x").is_err());
    }

    #[test]
    fn derivation_sources_listed() {
        let d = Derivation::Concat {
            sources: vec!["genus".to_string(), "specificEpithet".to_string()],
            separator: " ".to_string(),
        };
        assert_eq!(d.sources(), vec!["genus", "specificEpithet"]);
    }

    #[test]
    fn contributor_contradiction_and_sign() {
        let t = Contributor::new("genus", true);
        let f = Contributor::new("genus", false);
        let other = Contributor::new("family", false);
        assert!(t.contradicts(&f));
        assert!(!t.contradicts(&other));
        assert!(!t.contradicts(&t));
        assert_eq!(t.sign(), 't');
        assert_eq!(f.sign(), 'f');
        assert_eq!(t.to_string(), "genus:T");
    }

    #[test]
    fn observable_serde_round_trip() {
        let obs = Observable::new("scientificName")
            .unwrap()
            .with_style(Style::Canonical)
            .with_normalizer(Normalizer::CollapseWhitespace)
            .with_derivation(Derivation::Concat {
                sources: vec!["genus".to_string(), "specificEpithet".to_string()],
                separator: " ".to_string(),
            })
            .with_group("name");
        let json = serde_json::to_string(&obs).unwrap();
        let back: Observable = serde_json::from_str(&json).unwrap();
        assert_eq!(obs, back);
        assert_eq!(back.derivation, obs.derivation);
        assert_eq!(back.group.as_deref(), Some("name"));
    }
}
