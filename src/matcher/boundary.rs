//! External boundaries of the matcher.
//!
//! The matcher talks to a document store and a full-text index only through
//! these traits; concrete backends live outside the crate. All boundary
//! traits are `Send + Sync` so one matcher can serve concurrent callers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classification::Classification;
use crate::compiler::InferenceParameter;
use crate::error::{InferenceError, StoreError, TaxaResult};
use crate::inference::Inference;

/// A candidate's weight vector, keyed by canonical parameter id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    weights: HashMap<String, f64>,
}

impl Parameters {
    /// An empty weight vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a weight.
    pub fn set(&mut self, id: impl Into<String>, weight: f64) {
        self.weights.insert(id.into(), weight);
    }

    /// Builder-style `set`.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, weight: f64) -> Self {
        self.set(id, weight);
        self
    }

    /// Number of stored weights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Returns true if no weight is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Raw stored weight by parameter id.
    #[must_use]
    pub fn raw(&self, id: &str) -> Option<f64> {
        self.weights.get(id).copied()
    }

    /// Resolve a compiled parameter against this weight vector.
    ///
    /// Resolution order: a directly stored weight; for an inverted
    /// parameter, one minus its base parameter's weight; for an assembled
    /// parameter, the product of its pieces' stored weights.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::MissingParameter`] when none of the routes
    /// can produce a weight.
    pub fn resolve(&self, parameter: &InferenceParameter) -> Result<f64, InferenceError> {
        if let Some(weight) = self.raw(&parameter.id) {
            return Ok(weight);
        }
        if parameter.inverted {
            if let Some(base) = parameter
                .derived_from
                .first()
                .and_then(|id| self.raw(id))
            {
                return Ok(1.0 - base);
            }
        } else if !parameter.derived_from.is_empty() {
            let mut product = 1.0;
            for source in &parameter.derived_from {
                match self.raw(source) {
                    Some(weight) => product *= weight,
                    None => {
                        return Err(InferenceError::MissingParameter {
                            id: parameter.id.clone(),
                        })
                    }
                }
            }
            return Ok(product);
        }
        Err(InferenceError::MissingParameter {
            id: parameter.id.clone(),
        })
    }
}

/// A scored reference entry.
pub trait Candidate: Send + Sync {
    /// Stable candidate key in the store.
    fn key(&self) -> &str;

    /// The candidate's full classification.
    fn classification(&self) -> &Classification;

    /// Load the candidate's compiled weight vector.
    ///
    /// # Errors
    ///
    /// Backend failures surface as [`StoreError`] and abort the match.
    fn load_parameters(&self) -> Result<Parameters, StoreError>;

    /// Returns true if this entry is a synonym of another entry rather than
    /// an accepted name.
    fn is_synonym(&self) -> bool;
}

/// Search index and document store access.
pub trait Searcher<C: Candidate>: Send + Sync {
    /// Find candidate entries plausibly matching a prepared query.
    ///
    /// # Errors
    ///
    /// Backend failures surface as [`StoreError`] and abort the match.
    fn search(&self, query: &Classification) -> Result<Vec<Arc<C>>, StoreError>;

    /// Fetch one entry by store key.
    ///
    /// # Errors
    ///
    /// Backend failures surface as [`StoreError`]; an absent key is
    /// `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<Arc<C>>, StoreError>;
}

/// Query preparation: normalization plus derived-value fill-in.
pub trait Analyser: Send + Sync {
    /// Prepare a raw query for searching and scoring.
    ///
    /// # Errors
    ///
    /// A structurally invalid query (unknown keys, missing required
    /// observables, failing normalizers) is a hard error.
    fn prepare(&self, query: &Classification) -> TaxaResult<Classification>;
}

/// Posterior computation for one candidate.
pub trait Inferencer: Send + Sync {
    /// Compute the posterior of "the candidate is the queried taxon" given
    /// the evidence in the prepared query.
    ///
    /// # Errors
    ///
    /// Per-candidate failures (missing weights or variants) surface as
    /// [`InferenceError`]; the matcher skips the candidate and continues.
    fn probability(
        &self,
        query: &Classification,
        candidate: &Classification,
        parameters: &Parameters,
    ) -> Result<Inference, InferenceError>;
}
