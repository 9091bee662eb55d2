//! Compiled inference parameters and per-node state.
//!
//! An [`InferenceParameter`] is one conditional-probability formula: an
//! outcome, the postulates it is conditioned on as fixed background, and the
//! contributors that form the conditioning evidence. Identity is
//! deterministic: the canonical identifier is built from the outcome sign
//! and the postulate/contributor sign traces, so references stay stable
//! across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::horizon::Horizon;
use crate::observable::Contributor;

/// Turn an observable key into a generated-variable-safe stem.
fn variable_stem(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// A handle to a generated result variable.
///
/// Downstream generators emit one slot per variable; the compiler only
/// guarantees the identifiers are unique and stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultVariable {
    /// Generated variable identifier.
    pub id: String,

    /// Observable this variable belongs to.
    pub observable: String,
}

impl ResultVariable {
    /// Evidence variable for an observable (`e_<obs>`).
    #[must_use]
    pub fn evidence(observable: &str) -> Self {
        Self {
            id: format!("e_{}", variable_stem(observable)),
            observable: observable.to_string(),
        }
    }

    /// Positive-result variable for an observable (`c_<obs>_t`).
    #[must_use]
    pub fn positive(observable: &str) -> Self {
        Self {
            id: format!("c_{}_t", variable_stem(observable)),
            observable: observable.to_string(),
        }
    }

    /// Negative-result variable for an observable (`c_<obs>_f`).
    #[must_use]
    pub fn negative(observable: &str) -> Self {
        Self {
            id: format!("c_{}_f", variable_stem(observable)),
            observable: observable.to_string(),
        }
    }
}

/// One compiled conditional-probability formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceParameter {
    /// Canonical deterministic identifier.
    pub id: String,

    /// The outcome this formula scores.
    pub outcome: Contributor,

    /// Fixed background assumptions, typically over global input nodes.
    pub postulates: Vec<Contributor>,

    /// Conditioning evidence.
    pub contributors: Vec<Contributor>,

    /// Identifiers of the parameters this one is assembled from, when it is
    /// computed from already-compiled pieces rather than raw weights.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<String>,

    /// This parameter is the complement of another.
    #[serde(default)]
    pub inverted: bool,

    /// The postulates and contributors (or outcome) assert incompatible
    /// truth values for the same observable. Contradictory parameters are
    /// never materialized into the compiled output.
    #[serde(default)]
    pub contradiction: bool,
}

impl InferenceParameter {
    /// Build a parameter, computing its contradiction flag and canonical id.
    #[must_use]
    pub fn new(
        outcome: Contributor,
        postulates: Vec<Contributor>,
        contributors: Vec<Contributor>,
    ) -> Self {
        let contradiction = postulates.iter().any(|p| {
            p.contradicts(&outcome) || contributors.iter().any(|c| c.contradicts(p))
        });
        let id = Self::build_id(&outcome, &postulates, &contributors);
        Self {
            id,
            outcome,
            postulates,
            contributors,
            derived_from: Vec::new(),
            inverted: false,
            contradiction,
        }
    }

    /// The complement of this parameter: same conditioning, negated outcome.
    #[must_use]
    pub fn complement(&self) -> Self {
        let outcome = Contributor::new(self.outcome.observable.clone(), !self.outcome.value);
        let mut negated = Self::new(outcome, self.postulates.clone(), self.contributors.clone());
        negated.inverted = true;
        negated.derived_from = vec![self.id.clone()];
        negated
    }

    /// Link this parameter to the pieces it is assembled from.
    #[must_use]
    pub fn derived_from(mut self, sources: Vec<String>) -> Self {
        self.derived_from = sources;
        self
    }

    /// Canonical identifier: outcome sign plus postulate-sign and
    /// contributor-sign traces.
    fn build_id(
        outcome: &Contributor,
        postulates: &[Contributor],
        contributors: &[Contributor],
    ) -> String {
        let postulate_trace: String = postulates.iter().map(Contributor::sign).collect();
        let contributor_trace: String = contributors.iter().map(Contributor::sign).collect();
        format!(
            "inf_{}_{}${postulate_trace}${contributor_trace}",
            variable_stem(&outcome.observable),
            outcome.sign()
        )
    }

    /// Returns true if the two parameters denote the same formula:
    /// outcome, postulates and contributors all match.
    #[must_use]
    pub fn same_formula(&self, other: &Self) -> bool {
        self.outcome == other.outcome
            && self.postulates == other.postulates
            && self.contributors == other.contributors
    }

    /// Returns true if this parameter's conditioning is covered by a sign
    /// assignment: every contributor appears in `assignment` with the same
    /// truth value.
    #[must_use]
    pub fn matches_assignment(&self, assignment: &[Contributor]) -> bool {
        self.contributors.iter().all(|c| {
            assignment
                .iter()
                .any(|a| a.observable == c.observable && a.value == c.value)
        })
    }

    /// Returns true if this parameter carries the given postulate set.
    #[must_use]
    pub fn has_postulates(&self, postulates: &[Contributor]) -> bool {
        self.postulates == postulates
    }
}

impl PartialEq for InferenceParameter {
    fn eq(&self, other: &Self) -> bool {
        self.same_formula(other)
    }
}

impl Eq for InferenceParameter {}

impl fmt::Display for InferenceParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Per-observable compiled state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Observable identity key.
    pub observable: String,

    /// Evidence result variable.
    pub evidence: ResultVariable,

    /// Positive-result variable.
    pub positive: ResultVariable,

    /// Negative-result variable.
    pub negative: ResultVariable,

    /// Base-rate parameter (input nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<InferenceParameter>,

    /// Complement of the base-rate parameter (input nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverted_prior: Option<InferenceParameter>,

    /// Direct-parent conditional parameters.
    pub parameters: Vec<InferenceParameter>,

    /// The node's horizon.
    pub horizon: Horizon,

    /// Interior parameters assembled over the horizon, when non-trivial.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interior: Vec<InferenceParameter>,

    /// No incoming edges.
    pub input: bool,

    /// No outgoing edges.
    pub output: bool,

    /// A leaf that terminates a horizon or has no outgoing edges; downstream
    /// storage indexes on source nodes.
    pub source: bool,
}

impl Node {
    /// Fresh compiled state for an observable.
    #[must_use]
    pub fn new(observable: &str) -> Self {
        Self {
            observable: observable.to_string(),
            evidence: ResultVariable::evidence(observable),
            positive: ResultVariable::positive(observable),
            negative: ResultVariable::negative(observable),
            prior: None,
            inverted_prior: None,
            parameters: Vec::new(),
            horizon: Horizon::empty(),
            interior: Vec::new(),
            input: false,
            output: false,
            source: false,
        }
    }

    /// Look up a parameter by canonical identifier.
    #[must_use]
    pub fn parameter(&self, id: &str) -> Option<&InferenceParameter> {
        self.parameters
            .iter()
            .chain(self.interior.iter())
            .chain(self.prior.iter())
            .chain(self.inverted_prior.iter())
            .find(|p| p.id == id)
    }
}
