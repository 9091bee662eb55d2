//! Serialized network description.
//!
//! The wire document for a network: vertices with all their declared
//! attributes, edges as source/target pairs with an empty dependency marker,
//! plus issues, modifiers and vocabulary references. Round-trips losslessly
//! for vertices and edges.

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::issues::IssueDefinition;
use crate::network::{Dependency, Network, NetworkBuilder};
use crate::observable::{Modifier, Observable};

/// The empty payload attached to each serialized edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMarker {}

/// A serialized dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescription {
    /// Source observable key.
    pub source: String,

    /// Target observable key.
    pub target: String,

    /// Empty dependency marker.
    #[serde(default)]
    pub dependency: DependencyMarker,
}

/// A serialized network document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    /// Network identifier.
    pub id: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional erasure signature for this variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Observable vertices.
    pub vertices: Vec<Observable>,

    /// Dependency edges.
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,

    /// Issue definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<IssueDefinition>,

    /// Modifier definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<Modifier>,

    /// Vocabulary references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vocabularies: Vec<String>,
}

impl Network {
    /// Serialize this network into its description document.
    #[must_use]
    pub fn to_description(&self) -> NetworkDescription {
        NetworkDescription {
            id: self.id().to_string(),
            description: self.description().map(ToString::to_string),
            signature: self.signature().map(ToString::to_string),
            vertices: self.vertices().to_vec(),
            edges: self
                .edges()
                .iter()
                .map(|Dependency { source, target }| EdgeDescription {
                    source: source.clone(),
                    target: target.clone(),
                    dependency: DependencyMarker {},
                })
                .collect(),
            issues: self.issues().to_vec(),
            modifiers: self.modifiers().to_vec(),
            vocabularies: self.vocabularies().to_vec(),
        }
    }

    /// Build a network from a description document, validating the graph.
    pub fn from_description(description: NetworkDescription) -> Result<Self, NetworkError> {
        let mut builder = NetworkBuilder::new(description.id)
            .with_issues(description.issues)
            .with_modifiers(description.modifiers)
            .with_vocabularies(description.vocabularies);
        if let Some(text) = description.description {
            builder = builder.description(text);
        }
        if let Some(signature) = description.signature {
            builder = builder.signature(signature);
        }
        for vertex in description.vertices {
            builder = builder.vertex(vertex);
        }
        for edge in description.edges {
            builder = builder.edge(edge.source, edge.target);
        }
        builder.build()
    }
}
