//! Error types for taxamatch.
//!
//! Errors are strongly typed per layer using thiserror. Compilation errors
//! (`AnalysisError`) are always fatal: a malformed compiled network cannot be
//! trusted to produce correct probabilities. Scoring errors
//! (`InferenceError`) are recovered per candidate. Store errors propagate to
//! the caller unchanged.

use thiserror::Error;

/// Errors raised while constructing or transforming a network graph.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Two vertices share an identity key.
    #[error("Duplicate observable '{key}' in network")]
    DuplicateObservable {
        /// The duplicated identity key.
        key: String,
    },

    /// An edge references a key that is not a vertex.
    #[error("Edge endpoint '{key}' is not a vertex of the network")]
    UnknownEndpoint {
        /// The unknown endpoint key.
        key: String,
    },

    /// A query or transformation names a key that is not a vertex.
    #[error("Observable '{key}' is not a vertex of the network")]
    UnknownObservable {
        /// The unknown observable key.
        key: String,
    },

    /// The dependency graph is not acyclic.
    #[error("Network contains a cycle involving '{key}'")]
    Cycle {
        /// A vertex on the cycle.
        key: String,
    },

    /// A pattern normalizer does not compile.
    #[error("Invalid normalizer pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// The regex compiler's diagnostic.
        reason: String,
    },

    /// An identifier is empty or whitespace.
    #[error("Observable identifier cannot be empty")]
    EmptyIdentifier,
}

/// Errors raised during network compilation.
///
/// Any of these indicates an inconsistent network; compilation aborts rather
/// than silently degrading.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A horizon names an ancestor that was never compiled.
    #[error("Horizon of '{observable}' references '{target}', which has no compiled node")]
    MissingHorizonNode {
        /// Node whose horizon is being assembled.
        observable: String,
        /// The missing ancestor key.
        target: String,
    },

    /// Interior assembly found no parameter for a sign combination.
    #[error("No inference parameter of '{observable}' matches contributor pattern {pattern}")]
    NoMatchingParameter {
        /// Node whose parameter family was searched.
        observable: String,
        /// The contributor sign pattern that failed to resolve.
        pattern: String,
    },

    /// The network declares more erasure groups than the practical bound.
    #[error("Network has {count} erasure groups, exceeding the practical bound of {max}")]
    TooManyErasureGroups {
        /// Declared group count.
        count: usize,
        /// The bound.
        max: usize,
    },

    /// The network has more input observables than the practical bound.
    #[error("Network has {count} input observables, exceeding the practical bound of {max}")]
    TooManyInputs {
        /// Input observable count.
        count: usize,
        /// The bound.
        max: usize,
    },

    /// Derived observables cannot be ordered by dependency.
    #[error("No next derivable element: {reason}")]
    DerivationOrder {
        /// The observables that could not be resolved.
        reason: String,
    },

    /// A graph transformation failed during compilation.
    #[error("Network error during compilation: {0}")]
    Network(#[from] NetworkError),
}

/// Errors raised while scoring a single candidate.
///
/// These are recovered per candidate: the candidate is treated as
/// unscoreable, the match as a whole is never aborted.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The candidate's weight vector lacks a needed parameter.
    #[error("No weight for parameter '{id}' in candidate parameter vector")]
    MissingParameter {
        /// Canonical parameter identifier.
        id: String,
    },

    /// A value required for scoring is absent.
    #[error("Candidate lacks a value for required observable '{observable}'")]
    MissingValue {
        /// The observable without a value.
        observable: String,
    },

    /// No compiled variant exists for the query's evidence coverage.
    #[error("No compiled variant for evidence signature '{signature}'")]
    MissingVariant {
        /// The unmatched erasure signature.
        signature: String,
    },

    /// A resolved weight is not a probability.
    #[error("Probability {value} out of range [0.0, 1.0] for parameter '{id}'")]
    ProbabilityOutOfRange {
        /// Canonical parameter identifier.
        id: String,
        /// The out-of-range weight.
        value: f64,
    },
}

/// Errors surfaced by the external searcher/storage boundary.
///
/// The matcher never retries these; they propagate to the caller unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A keyed fetch found nothing where an entry was required.
    #[error("Candidate not found: {key}")]
    NotFound {
        /// The missing store key.
        key: String,
    },

    /// The backend failed.
    #[error("Store backend error: {message}")]
    Backend {
        /// Backend diagnostic.
        message: String,
    },
}

/// Top-level error type for taxamatch.
#[derive(Debug, Error)]
pub enum TaxaError {
    /// Graph construction or transformation failed.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Network compilation failed.
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// A candidate could not be scored.
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// The external store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The query is structurally unusable.
    #[error("Invalid query: {reason}")]
    InvalidQuery {
        /// What makes the query unusable.
        reason: String,
    },
}

impl TaxaError {
    /// Creates an invalid-query error (structurally unusable input).
    #[must_use]
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a network construction error.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Returns true if this is a compilation error.
    #[must_use]
    pub const fn is_analysis(&self) -> bool {
        matches!(self, Self::Analysis(_))
    }

    /// Returns true if this is a per-candidate scoring error.
    #[must_use]
    pub const fn is_inference(&self) -> bool {
        matches!(self, Self::Inference(_))
    }

    /// Returns true if this is an external store error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns true if the error is recoverable per candidate rather than
    /// fatal to the whole match.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Inference(_))
    }
}

/// Result type alias for taxamatch operations.
pub type TaxaResult<T> = Result<T, TaxaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_error_missing_horizon_node() {
        let err = AnalysisError::MissingHorizonNode {
            observable: "scientificName".to_string(),
            target: "genus".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("scientificName"));
        assert!(msg.contains("genus"));
    }

    #[test]
    fn analysis_error_erasure_bound() {
        let err = AnalysisError::TooManyErasureGroups { count: 12, max: 8 };
        let msg = format!("{err}");
        assert!(msg.contains("12"));
        assert!(msg.contains('8'));
    }

    #[test]
    fn taxa_error_from_analysis() {
        let err: TaxaError = AnalysisError::DerivationOrder {
            reason: "cycle".to_string(),
        }
        .into();
        assert!(err.is_analysis());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn taxa_error_from_inference_is_recoverable() {
        let err: TaxaError = InferenceError::MissingParameter {
            id: "inf_genus_t$$t".to_string(),
        }
        .into();
        assert!(err.is_inference());
        assert!(err.is_recoverable());
    }

    #[test]
    fn taxa_error_from_store() {
        let err: TaxaError = StoreError::Backend {
            message: "connection refused".to_string(),
        }
        .into();
        assert!(err.is_store());
        assert!(!err.is_recoverable());
        assert!(format!("{err}").contains("connection refused"));
    }

    #[test]
    fn network_error_wraps_into_analysis() {
        let err: AnalysisError = NetworkError::UnknownObservable {
            key: "family".to_string(),
        }
        .into();
        assert!(format!("{err}").contains("family"));
    }

    #[test]
    fn invalid_query_is_hard_failure() {
        let err = TaxaError::invalid_query("required input 'kingdom' unparseable");
        assert!(!err.is_recoverable());
        assert!(format!("{err}").contains("kingdom"));
    }
}
