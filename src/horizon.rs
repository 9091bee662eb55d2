//! Horizon computation.
//!
//! A node's horizon is the minimal set of ancestors the compiler must
//! condition on to make that node's probability computation self-contained,
//! split into direct parents and "interior" members whose own compiled
//! parameters are looked up rather than recomputed. The service is
//! pluggable; the compiler depends only on the contract, not the algorithm.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, NetworkError};
use crate::network::Network;
use crate::observable::Observable;

/// The minimal ancestor set for one observable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    /// All ancestors conditioned on.
    pub vertices: BTreeSet<String>,

    /// Members reachable only through other horizon vertices; their own
    /// compiled parameters are looked up during assembly.
    pub interior: BTreeSet<String>,
}

impl Horizon {
    /// An empty horizon (input node).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the horizon needs no interior parameter assembly.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.interior.is_empty()
    }

    /// Returns true if the key is a horizon vertex.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vertices.contains(key)
    }
}

/// Pluggable horizon computation over the reversed (ancestor) graph.
pub trait HorizonService: Send + Sync {
    /// Compute the horizon of one observable.
    ///
    /// Contract: the vertex set contains exactly the ancestors the compiler
    /// must condition on; `interior` is the subset that is not a direct
    /// parent, and every interior member's own parents are again horizon
    /// vertices (so contributor-subset lookups always resolve).
    fn compute_horizon(&self, network: &Network, observable: &str)
        -> Result<Horizon, AnalysisError>;
}

/// Default horizon algorithm.
///
/// Takes the direct parents plus every branch point of the ancestor cone
/// (a vertex with two or more outgoing edges inside the cone makes horizon
/// members dependent, so its value must be conditioned on), then closes the
/// set so each interior member's parents are themselves horizon members.
/// Tree-shaped cones yield an empty interior.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchHorizon;

impl BranchHorizon {
    /// Create the default horizon service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HorizonService for BranchHorizon {
    fn compute_horizon(
        &self,
        network: &Network,
        observable: &str,
    ) -> Result<Horizon, AnalysisError> {
        if !network.contains(observable) {
            return Err(AnalysisError::Network(NetworkError::UnknownObservable {
                key: observable.to_string(),
            }));
        }

        let parents: BTreeSet<String> = network
            .incoming(observable)
            .into_iter()
            .map(|o| o.key().to_string())
            .collect();
        let cone = network.ancestors(observable);

        let mut vertices = parents.clone();
        for vertex in &cone {
            let fanout = network
                .outgoing(vertex)
                .into_iter()
                .map(Observable::key)
                .filter(|child| *child == observable || cone.contains(*child))
                .count();
            if fanout >= 2 {
                vertices.insert(vertex.clone());
            }
        }

        // Close over interior parents so every interior member's conditioning
        // context is available at assembly time.
        loop {
            let mut added = Vec::new();
            for vertex in &vertices {
                if parents.contains(vertex) {
                    continue;
                }
                for parent in network.incoming(vertex) {
                    let key = parent.key();
                    if !vertices.contains(key) {
                        added.push(key.to_string());
                    }
                }
            }
            if added.is_empty() {
                break;
            }
            vertices.extend(added);
        }

        let interior: BTreeSet<String> = vertices.difference(&parents).cloned().collect();
        Ok(Horizon { vertices, interior })
    }
}
