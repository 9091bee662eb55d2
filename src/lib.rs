//! Probabilistic matching of partial biological classifications.
//!
//! taxamatch compiles a declarative Bayesian network of observable evidence
//! (taxon ranks, names, identifiers) into the full set of conditional
//! probability parameters needed to score reference entries, then matches
//! partially-specified classifications against a corpus through a pluggable
//! store boundary.
//!
//! The pipeline has three stages:
//!
//! 1. **Describe**: build a [`network::Network`] of [`observable::Observable`]
//!    vertices and dependency edges, or load one from its serialized
//!    [`network::NetworkDescription`].
//! 2. **Compile**: [`compiler::NetworkCompiler`] turns the network into a
//!    [`compiler::CompiledNetwork`]: per-node parameter families for every
//!    postulate signature, horizon-factored interior parameters, and one
//!    child variant per erasure sub-network.
//! 3. **Match**: [`matcher::ClassificationMatcher`] prepares a query,
//!    searches a [`matcher::Searcher`] backend, scores each candidate into
//!    an [`inference::Inference`] and resolves a winner under configurable
//!    thresholds.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taxamatch::compiler::NetworkCompiler;
//! use taxamatch::network::Network;
//! use taxamatch::observable::Observable;
//!
//! # fn main() -> taxamatch::error::TaxaResult<()> {
//! let network = Network::builder("linnaean")
//!     .vertex(Observable::new("kingdom")?)
//!     .vertex(Observable::new("genus")?)
//!     .edge("kingdom", "genus")
//!     .build()?;
//! let compiled = Arc::new(NetworkCompiler::new().analyse(&network)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod classification;
pub mod compiler;
pub mod error;
pub mod horizon;
pub mod inference;
pub mod issues;
pub mod matcher;
pub mod network;
pub mod observable;
pub mod value;

pub use classification::{Classification, Layout};
pub use compiler::{CompiledNetwork, InferenceParameter, NetworkCompiler};
pub use error::{TaxaError, TaxaResult};
pub use inference::Inference;
pub use issues::Issues;
pub use matcher::{ClassificationMatcher, Match, MatcherOptions};
pub use network::{Network, NetworkBuilder};
pub use observable::Observable;
pub use value::Value;
