//! The network compiler.
//!
//! Walks every observable in topological order and builds the complete
//! combinatorial set of conditional-probability parameters: per postulate
//! signature over the global inputs, per sign assignment over direct
//! parents, plus "interior" parameters assembled over the horizon when the
//! ancestor cone is not tree-shaped. One child network is compiled per
//! erasure sub-network, so a matcher can score evidence with whole groups
//! absent.

pub mod parameter;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::classification::Layout;
use crate::error::AnalysisError;
use crate::horizon::{BranchHorizon, HorizonService};
use crate::network::Network;
use crate::observable::{Contributor, Observable};

pub use parameter::{InferenceParameter, Node, ResultVariable};

/// Practical bound on global input nodes; each input doubles the number of
/// postulate signatures.
pub const MAX_INPUTS: usize = 12;

/// Enumerate every sign assignment over a list of observable keys.
///
/// Assignment order is deterministic: ascending bit masks, bit `i` giving
/// the truth value of `keys[i]`.
#[must_use]
pub fn sign_assignments(keys: &[String]) -> Vec<Vec<Contributor>> {
    let count = 1usize << keys.len();
    let mut assignments = Vec::with_capacity(count);
    for mask in 0..count {
        let assignment = keys
            .iter()
            .enumerate()
            .map(|(i, key)| Contributor::new(key.clone(), mask & (1 << i) != 0))
            .collect();
        assignments.push(assignment);
    }
    assignments
}

/// A uniform sign assignment over a list of keys.
#[must_use]
pub fn uniform_assignment(keys: &[String], value: bool) -> Vec<Contributor> {
    keys.iter()
        .map(|key| Contributor::new(key.clone(), value))
        .collect()
}

/// A fully compiled network: per-node parameters, generator orderings and
/// one child per erasure variant. Immutable and safely shared across
/// concurrent matcher instances.
#[derive(Debug, Clone)]
pub struct CompiledNetwork {
    network: Network,
    layout: Arc<Layout>,
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    inputs: Vec<String>,
    derivation_order: Vec<String>,
    base_order: Vec<String>,
    children: Vec<CompiledNetwork>,
}

impl CompiledNetwork {
    /// The network this compilation was produced from.
    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The slot layout for classifications over this network.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Compiled nodes in topological order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a compiled node by observable key.
    #[must_use]
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.node_index.get(key).map(|i| &self.nodes[*i])
    }

    /// Global input observable keys, in topological order.
    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Topological order of derived observables, by dependency on other
    /// derivations. Required before any code or document generation.
    #[must_use]
    pub fn derivation_order(&self) -> &[String] {
        &self.derivation_order
    }

    /// Directly-populated (non-derived) observables in topological order.
    #[must_use]
    pub fn base_order(&self) -> &[String] {
        &self.base_order
    }

    /// Child compilations, one per erasure sub-network.
    #[must_use]
    pub fn children(&self) -> &[CompiledNetwork] {
        &self.children
    }

    /// Signature of this variant; the root carries the all-present string.
    #[must_use]
    pub fn signature(&self) -> String {
        self.network
            .signature()
            .map_or_else(|| self.network.full_signature(), ToString::to_string)
    }

    /// Select the variant (this network or a child) with this signature.
    #[must_use]
    pub fn variant(&self, signature: &str) -> Option<&CompiledNetwork> {
        if self.signature() == signature {
            return Some(self);
        }
        self.children
            .iter()
            .find(|child| child.signature() == signature)
    }

    /// Look up a parameter anywhere in this variant by canonical id.
    #[must_use]
    pub fn parameter(&self, id: &str) -> Option<&InferenceParameter> {
        self.nodes.iter().find_map(|node| node.parameter(id))
    }
}

/// Compiles a [`Network`] into a [`CompiledNetwork`].
pub struct NetworkCompiler {
    horizon: Arc<dyn HorizonService>,
}

impl Default for NetworkCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkCompiler {
    /// A compiler using the default horizon service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            horizon: Arc::new(BranchHorizon::new()),
        }
    }

    /// A compiler using a custom horizon service.
    #[must_use]
    pub fn with_horizon_service(horizon: Arc<dyn HorizonService>) -> Self {
        Self { horizon }
    }

    /// Compile the network and every erasure variant.
    ///
    /// # Errors
    ///
    /// Fails with an [`AnalysisError`] when the erasure-group or input
    /// bounds are exceeded, when a horizon references an uncompiled node,
    /// when no parameter matches an expected contributor pattern, or when
    /// the derivation graph has no valid ordering. All of these indicate an
    /// inconsistent network and abort compilation.
    pub fn analyse(&self, network: &Network) -> Result<CompiledNetwork, AnalysisError> {
        let groups = network.erasure_groups();
        if groups.len() > Network::MAX_ERASURE_GROUPS {
            return Err(AnalysisError::TooManyErasureGroups {
                count: groups.len(),
                max: Network::MAX_ERASURE_GROUPS,
            });
        }

        let mut root = self.analyse_variant(network)?;

        // One child per non-empty erased subset; each is independent, so
        // they compile in parallel.
        let subsets: Vec<BTreeSet<String>> = (1..(1usize << groups.len()))
            .map(|mask| {
                groups
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, g)| g.clone())
                    .collect()
            })
            .collect();
        root.children = subsets
            .into_par_iter()
            .map(|erased| {
                let variant = network.erase(&erased)?;
                self.analyse_variant(&variant)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            network = %network.id(),
            nodes = root.nodes.len(),
            variants = root.children.len() + 1,
            "network compiled"
        );
        Ok(root)
    }

    /// Compile a single variant, without erasure children.
    fn analyse_variant(&self, network: &Network) -> Result<CompiledNetwork, AnalysisError> {
        let order: Vec<String> = network
            .topological_order()
            .iter()
            .map(|o| o.key().to_string())
            .collect();
        let inputs: Vec<String> = network
            .inputs()
            .iter()
            .map(|o| o.key().to_string())
            .collect();
        if inputs.len() > MAX_INPUTS {
            return Err(AnalysisError::TooManyInputs {
                count: inputs.len(),
                max: MAX_INPUTS,
            });
        }
        let postulate_signatures = sign_assignments(&inputs);

        let mut nodes: Vec<Node> = Vec::with_capacity(order.len());
        let mut node_index: HashMap<String, usize> = HashMap::with_capacity(order.len());

        for key in &order {
            let node = self.compile_node(network, key, &postulate_signatures, &nodes, &node_index)?;
            node_index.insert(key.clone(), nodes.len());
            nodes.push(node);
        }

        // Source nodes: outputs, plus inputs that terminate some horizon.
        let horizon_members: HashSet<&str> = nodes
            .iter()
            .flat_map(|n| n.horizon.vertices.iter().map(String::as_str))
            .collect();
        let mut sources: Vec<bool> = Vec::with_capacity(nodes.len());
        for node in &nodes {
            sources.push(node.output || (node.input && horizon_members.contains(node.observable.as_str())));
        }
        for (node, source) in nodes.iter_mut().zip(sources) {
            node.source = source;
        }

        let layout = Arc::new(Layout::new(order).map_err(AnalysisError::Network)?);
        let derivation_order = Self::derivation_order(network)?;
        let base_order = network
            .topological_order()
            .iter()
            .filter(|o| !o.is_derived())
            .map(|o| o.key().to_string())
            .collect();

        Ok(CompiledNetwork {
            network: network.clone(),
            layout,
            nodes,
            node_index,
            inputs,
            derivation_order,
            base_order,
            children: Vec::new(),
        })
    }

    /// Compile one node: direct-parent parameters, horizon, interior
    /// parameters, priors.
    fn compile_node(
        &self,
        network: &Network,
        key: &str,
        postulate_signatures: &[Vec<Contributor>],
        compiled: &[Node],
        compiled_index: &HashMap<String, usize>,
    ) -> Result<Node, AnalysisError> {
        let parents: Vec<String> = network
            .incoming(key)
            .iter()
            .map(|o| o.key().to_string())
            .collect();

        let mut node = Node::new(key);
        node.input = parents.is_empty();
        node.output = network.outgoing(key).is_empty();

        // Step 2: the full combinatorial family over postulates and direct
        // parents; contradictory candidates are never materialized.
        for postulates in postulate_signatures {
            for assignment in sign_assignments(&parents) {
                let positive = InferenceParameter::new(
                    Contributor::new(key, true),
                    postulates.clone(),
                    assignment,
                );
                let negative = positive.complement();
                if !positive.contradiction {
                    node.parameters.push(positive);
                }
                if !negative.contradiction {
                    node.parameters.push(negative);
                }
            }
        }

        // Steps 3-4: horizon and interior assembly.
        node.horizon = self.horizon.compute_horizon(network, key)?;
        if !node.horizon.is_trivial() {
            let horizon_keys: Vec<String> = node.horizon.vertices.iter().cloned().collect();
            for postulates in postulate_signatures {
                for assignment in sign_assignments(&horizon_keys) {
                    let assembled = Self::assemble_interior(
                        key,
                        postulates,
                        &assignment,
                        &node,
                        compiled,
                        compiled_index,
                    )?;
                    if let Some(assembled) = assembled {
                        let complement = assembled.complement();
                        node.interior.push(assembled);
                        if !complement.contradiction {
                            node.interior.push(complement);
                        }
                    }
                }
            }
        }

        // Step 5: base rates for inputs.
        if node.input {
            let prior = InferenceParameter::new(Contributor::new(key, true), vec![], vec![]);
            node.inverted_prior = Some(prior.complement());
            node.prior = Some(prior);
        }

        Ok(node)
    }

    /// Assemble one interior parameter for a sign assignment over the
    /// horizon, linking the matching direct parameter and each interior
    /// ancestor's own compiled parameter.
    ///
    /// Returns `Ok(None)` for assignments contradicting the postulates;
    /// those combinations are never materialized.
    fn assemble_interior(
        key: &str,
        postulates: &[Contributor],
        assignment: &[Contributor],
        node: &Node,
        compiled: &[Node],
        compiled_index: &HashMap<String, usize>,
    ) -> Result<Option<InferenceParameter>, AnalysisError> {
        let assembled = InferenceParameter::new(
            Contributor::new(key, true),
            postulates.to_vec(),
            assignment.to_vec(),
        );
        if assembled.contradiction {
            return Ok(None);
        }

        let pattern = || {
            assignment
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };

        let direct = node
            .parameters
            .iter()
            .find(|p| {
                p.outcome.value
                    && !p.inverted
                    && p.has_postulates(postulates)
                    && p.matches_assignment(assignment)
            })
            .ok_or_else(|| AnalysisError::NoMatchingParameter {
                observable: key.to_string(),
                pattern: pattern(),
            })?;

        let mut sources = vec![direct.id.clone()];
        for ancestor in &node.horizon.interior {
            let ancestor_node = compiled_index
                .get(ancestor)
                .map(|i| &compiled[*i])
                .ok_or_else(|| AnalysisError::MissingHorizonNode {
                    observable: key.to_string(),
                    target: ancestor.clone(),
                })?;
            let sign = assignment
                .iter()
                .find(|c| c.observable == *ancestor)
                .map(|c| c.value)
                .ok_or_else(|| AnalysisError::MissingHorizonNode {
                    observable: key.to_string(),
                    target: ancestor.clone(),
                })?;
            let piece = ancestor_node
                .parameters
                .iter()
                .chain(ancestor_node.prior.iter())
                .chain(ancestor_node.inverted_prior.iter())
                .find(|p| {
                    p.outcome == Contributor::new(ancestor.clone(), sign)
                        && (p.has_postulates(postulates) || p.postulates.is_empty())
                        && p.matches_assignment(assignment)
                })
                .ok_or_else(|| AnalysisError::NoMatchingParameter {
                    observable: ancestor.clone(),
                    pattern: pattern(),
                })?;
            sources.push(piece.id.clone());
        }

        Ok(Some(assembled.derived_from(sources)))
    }

    /// Topological order of derived observables by derivation dependency.
    fn derivation_order(network: &Network) -> Result<Vec<String>, AnalysisError> {
        let derived: Vec<&Observable> = network
            .topological_order()
            .into_iter()
            .filter(|o| o.is_derived())
            .collect();
        let mut remaining: Vec<&Observable> = derived;
        let mut ordered: Vec<String> = Vec::with_capacity(remaining.len());
        let mut done: HashSet<String> = HashSet::new();

        while !remaining.is_empty() {
            let next = remaining.iter().position(|o| {
                o.derivation
                    .as_ref()
                    .map_or(true, |derivation| {
                        derivation.sources().iter().all(|source| {
                            match network.observable(source) {
                                Some(s) => !s.is_derived() || done.contains(s.key()),
                                None => false,
                            }
                        })
                    })
            });
            let Some(position) = next else {
                let stuck: Vec<&str> = remaining.iter().map(|o| o.key()).collect();
                return Err(AnalysisError::DerivationOrder {
                    reason: format!("unresolvable derivations: {}", stuck.join(", ")),
                });
            };
            let observable = remaining.remove(position);
            done.insert(observable.key().to_string());
            ordered.push(observable.key().to_string());
        }
        Ok(ordered)
    }
}
