//! The evidence graph.
//!
//! A [`Network`] is a directed acyclic graph of observables connected by
//! dependencies, plus the metadata a compiled matcher needs: issue
//! definitions, modifiers, vocabulary references and an optional erasure
//! signature. Networks are immutable; they are built through
//! [`NetworkBuilder`] and every transformation returns a new instance.

pub mod format;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::NetworkError;
use crate::issues::IssueDefinition;
use crate::observable::{Modifier, Observable};

pub use format::NetworkDescription;

/// A directed edge: the target's probability depends on the source.
///
/// Dependencies carry no payload beyond connecting two observables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Key of the observable depended on.
    pub source: String,

    /// Key of the dependent observable.
    pub target: String,
}

impl Dependency {
    /// Construct an edge between two observable keys.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// An immutable DAG of observables with dependency edges.
#[derive(Debug, Clone)]
pub struct Network {
    id: String,
    description: Option<String>,
    signature: Option<String>,
    vertices: Vec<Observable>,
    index: HashMap<String, usize>,
    edges: Vec<Dependency>,
    issues: Vec<IssueDefinition>,
    modifiers: Vec<Modifier>,
    vocabularies: Vec<String>,
    topology: Vec<usize>,
}

impl Network {
    /// Practical bound on erasure groups; each group doubles the number of
    /// compiled network variants.
    pub const MAX_ERASURE_GROUPS: usize = 8;

    /// Start building a network.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> NetworkBuilder {
        NetworkBuilder::new(id)
    }

    /// Network identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Erasure signature of this variant ("TFTF…"), if assigned.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Look up an observable by identity key.
    #[must_use]
    pub fn observable(&self, key: &str) -> Option<&Observable> {
        self.index.get(key).map(|i| &self.vertices[*i])
    }

    /// Returns true if the key names a vertex.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// All vertices in insertion order.
    #[must_use]
    pub fn vertices(&self) -> &[Observable] {
        &self.vertices
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    /// Issue definitions owned by the network.
    #[must_use]
    pub fn issues(&self) -> &[IssueDefinition] {
        &self.issues
    }

    /// Modifier list owned by the network.
    #[must_use]
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Vocabulary references owned by the network.
    #[must_use]
    pub fn vocabularies(&self) -> &[String] {
        &self.vocabularies
    }

    /// Vertices in topological order (sources before dependents).
    #[must_use]
    pub fn topological_order(&self) -> Vec<&Observable> {
        self.topology.iter().map(|i| &self.vertices[*i]).collect()
    }

    /// Direct predecessors of an observable (what it depends on).
    #[must_use]
    pub fn incoming(&self, key: &str) -> Vec<&Observable> {
        self.edges
            .iter()
            .filter(|e| e.target == key)
            .filter_map(|e| self.observable(&e.source))
            .collect()
    }

    /// Direct successors of an observable (what depends on it).
    #[must_use]
    pub fn outgoing(&self, key: &str) -> Vec<&Observable> {
        self.edges
            .iter()
            .filter(|e| e.source == key)
            .filter_map(|e| self.observable(&e.target))
            .collect()
    }

    /// Input observables: no incoming edges.
    #[must_use]
    pub fn inputs(&self) -> Vec<&Observable> {
        self.topological_order()
            .into_iter()
            .filter(|o| self.incoming(o.key()).is_empty())
            .collect()
    }

    /// Output observables: no outgoing edges.
    #[must_use]
    pub fn outputs(&self) -> Vec<&Observable> {
        self.topological_order()
            .into_iter()
            .filter(|o| self.outgoing(o.key()).is_empty())
            .collect()
    }

    /// All transitive predecessors of an observable.
    #[must_use]
    pub fn ancestors(&self, key: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = self
            .incoming(key)
            .into_iter()
            .map(|o| o.key().to_string())
            .collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for parent in self.incoming(&current) {
                queue.push_back(parent.key().to_string());
            }
        }
        seen
    }

    /// Distinct erasure-group tags, in topological order of first appearance.
    #[must_use]
    pub fn erasure_groups(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut groups = Vec::new();
        for observable in self.topological_order() {
            if let Some(group) = &observable.group {
                if seen.insert(group.clone()) {
                    groups.push(group.clone());
                }
            }
        }
        groups
    }

    /// Extract the sub-network over `keep`, connecting kept vertices
    /// directly whenever the only path between them passes exclusively
    /// through dropped vertices.
    ///
    /// The result is an independent copy, never a view.
    pub fn subgraph(
        &self,
        keep: &HashSet<&str>,
        signature: Option<String>,
    ) -> Result<Self, NetworkError> {
        for key in keep {
            if !self.contains(key) {
                return Err(NetworkError::UnknownObservable {
                    key: (*key).to_string(),
                });
            }
        }

        let vertices: Vec<Observable> = self
            .vertices
            .iter()
            .filter(|o| keep.contains(o.key()))
            .cloned()
            .collect();

        // Walk forward from each kept vertex through dropped vertices only;
        // every kept vertex reached gets a direct edge.
        let mut edges: Vec<Dependency> = Vec::new();
        let mut edge_set: HashSet<(String, String)> = HashSet::new();
        for origin in self.topological_order() {
            if !keep.contains(origin.key()) {
                continue;
            }
            let mut visited: HashSet<String> = HashSet::new();
            let mut stack: Vec<String> = self
                .outgoing(origin.key())
                .into_iter()
                .map(|o| o.key().to_string())
                .collect();
            while let Some(current) = stack.pop() {
                if !visited.insert(current.clone()) {
                    continue;
                }
                if keep.contains(current.as_str()) {
                    let pair = (origin.key().to_string(), current.clone());
                    if edge_set.insert(pair.clone()) {
                        edges.push(Dependency::new(pair.0, pair.1));
                    }
                } else {
                    for next in self.outgoing(&current) {
                        stack.push(next.key().to_string());
                    }
                }
            }
        }

        let mut builder = NetworkBuilder::new(self.id.clone())
            .with_issues(self.issues.clone())
            .with_modifiers(self.modifiers.clone())
            .with_vocabularies(self.vocabularies.clone());
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        if let Some(signature) = signature {
            builder = builder.signature(signature);
        }
        for vertex in vertices {
            builder = builder.vertex(vertex);
        }
        for edge in edges {
            builder = builder.edge(edge.source, edge.target);
        }
        builder.build()
    }

    /// Derive the sub-network with the given erasure groups omitted.
    ///
    /// The signature string records, per group in [`Network::erasure_groups`]
    /// order, whether the group is present (`T`) or erased (`F`).
    pub fn erase(&self, erased: &BTreeSet<String>) -> Result<Self, NetworkError> {
        let groups = self.erasure_groups();
        let signature: String = groups
            .iter()
            .map(|g| if erased.contains(g) { 'F' } else { 'T' })
            .collect();
        let keep: HashSet<&str> = self
            .vertices
            .iter()
            .filter(|o| o.group.as_ref().map_or(true, |g| !erased.contains(g)))
            .map(Observable::key)
            .collect();
        debug!(
            network = %self.id,
            signature = %signature,
            kept = keep.len(),
            "deriving erasure sub-network"
        );
        self.subgraph(&keep, Some(signature))
    }

    /// The signature of the all-groups-present variant.
    #[must_use]
    pub fn full_signature(&self) -> String {
        "T".repeat(self.erasure_groups().len())
    }
}

/// Builder producing an immutable [`Network`].
///
/// Validation happens at [`NetworkBuilder::build`]: unique vertex keys,
/// known edge endpoints, well-formed normalizers, acyclicity.
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    id: String,
    description: Option<String>,
    signature: Option<String>,
    vertices: Vec<Observable>,
    edges: Vec<Dependency>,
    issues: Vec<IssueDefinition>,
    modifiers: Vec<Modifier>,
    vocabularies: Vec<String>,
}

impl NetworkBuilder {
    /// Start a builder for a network with this identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the erasure signature for this variant.
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Add a vertex.
    #[must_use]
    pub fn vertex(mut self, observable: Observable) -> Self {
        self.vertices.push(observable);
        self
    }

    /// Add a dependency edge between two vertex keys.
    #[must_use]
    pub fn edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edges.push(Dependency::new(source, target));
        self
    }

    /// Add an issue definition.
    #[must_use]
    pub fn issue(mut self, issue: IssueDefinition) -> Self {
        self.issues.push(issue);
        self
    }

    /// Replace the issue definitions.
    #[must_use]
    pub fn with_issues(mut self, issues: Vec<IssueDefinition>) -> Self {
        self.issues = issues;
        self
    }

    /// Add a modifier.
    #[must_use]
    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Replace the modifier list.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Vec<Modifier>) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Add a vocabulary reference.
    #[must_use]
    pub fn vocabulary(mut self, vocabulary: impl Into<String>) -> Self {
        self.vocabularies.push(vocabulary.into());
        self
    }

    /// Replace the vocabulary references.
    #[must_use]
    pub fn with_vocabularies(mut self, vocabularies: Vec<String>) -> Self {
        self.vocabularies = vocabularies;
        self
    }

    /// Validate and build the immutable network.
    pub fn build(self) -> Result<Network, NetworkError> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(self.vertices.len());
        for (i, vertex) in self.vertices.iter().enumerate() {
            if vertex.id.trim().is_empty() {
                return Err(NetworkError::EmptyIdentifier);
            }
            if let Some(normalizer) = &vertex.normalizer {
                normalizer.validate()?;
            }
            if index.insert(vertex.key().to_string(), i).is_some() {
                return Err(NetworkError::DuplicateObservable {
                    key: vertex.key().to_string(),
                });
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !index.contains_key(endpoint) {
                    return Err(NetworkError::UnknownEndpoint {
                        key: endpoint.clone(),
                    });
                }
            }
        }

        let topology = Self::topological_sort(&self.vertices, &index, &self.edges)?;

        Ok(Network {
            id: self.id,
            description: self.description,
            signature: self.signature,
            vertices: self.vertices,
            index,
            edges: self.edges,
            issues: self.issues,
            modifiers: self.modifiers,
            vocabularies: self.vocabularies,
            topology,
        })
    }

    /// Kahn's algorithm; ties resolved by vertex insertion order so the
    /// topology is deterministic across runs.
    fn topological_sort(
        vertices: &[Observable],
        index: &HashMap<String, usize>,
        edges: &[Dependency],
    ) -> Result<Vec<usize>, NetworkError> {
        let n = vertices.len();
        let mut in_degree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in edges {
            let source = index[&edge.source];
            let target = index[&edge.target];
            in_degree[target] += 1;
            successors[source].push(target);
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|i| in_degree[*i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &succ in &successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() < n {
            let stuck = (0..n)
                .find(|i| in_degree[*i] > 0)
                .map_or_else(String::new, |i| vertices[i].key().to_string());
            return Err(NetworkError::Cycle { key: stuck });
        }
        Ok(order)
    }
}
