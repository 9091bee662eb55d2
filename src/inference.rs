//! Runtime posterior computation.
//!
//! An [`Inference`] is the Bayes-rule combination of a prior, the overall
//! probability of the observed evidence, and the probability of that
//! evidence assuming the hypothesis. The two constructors cover the duality
//! between supplying `P(E|H)` directly and supplying the joint `P(E,H)`.

use serde::{Deserialize, Serialize};

/// A single posterior computation.
///
/// All components are probabilities in `[0, 1]`; the constructors guard the
/// divisions, so a zero-probability evidence term yields a zero posterior
/// instead of a NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// `P(H)`: prior probability of the hypothesis.
    pub prior: f64,

    /// `P(E)`: overall probability of the evidence.
    pub evidence: f64,

    /// `P(E|H)`: probability of the evidence assuming the hypothesis.
    pub conditional: f64,

    /// `P(H|E)`: posterior probability of the hypothesis.
    pub posterior: f64,
}

impl Inference {
    /// Build from prior, evidence and conditional probabilities.
    ///
    /// `posterior = prior * conditional / evidence`, `0` when the evidence
    /// term is zero.
    #[must_use]
    pub fn for_pec(prior: f64, evidence: f64, conditional: f64) -> Self {
        let posterior = if evidence == 0.0 {
            0.0
        } else {
            prior * conditional / evidence
        };
        Self {
            prior,
            evidence,
            conditional,
            posterior,
        }
    }

    /// Build from prior, evidence and the joint probability `P(E,H)`.
    ///
    /// The conditional is recovered as `joint / prior`, `0` when the prior
    /// is zero.
    #[must_use]
    pub fn for_peh(prior: f64, evidence: f64, joint: f64) -> Self {
        let conditional = if prior == 0.0 { 0.0 } else { joint / prior };
        Self::for_pec(prior, evidence, conditional)
    }

    /// How much the evidence moved the hypothesis: `P(E|H) / P(E)`.
    ///
    /// Greater than one means the evidence supports the hypothesis; zero
    /// when the evidence term is zero.
    #[must_use]
    pub fn boost(&self) -> f64 {
        if self.evidence == 0.0 {
            0.0
        } else {
            self.conditional / self.evidence
        }
    }
}
