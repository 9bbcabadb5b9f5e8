//! Authored node and graph document definitions

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{NodeId, NodeKind};

/// One authored unit of curriculum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Text, or serialized JSON for carousel and media nodes
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub successors: Vec<NodeId>,
}

impl LearningNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            content: content.into(),
            successors: Vec::new(),
        }
    }

    pub fn with_successors<I, S>(mut self, successors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.successors = successors.into_iter().map(Into::into).collect();
        self
    }

    pub fn first_successor(&self) -> Option<&NodeId> {
        self.successors.first()
    }
}

/// Declarative exception for a single node, shipped alongside the graph
///
/// Replaces hard-coded id checks: authored content that needs a node read
/// as a different kind, or a fixed exit once its options are exhausted,
/// says so here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOverride {
    pub node: NodeId,
    /// Treat the node as this kind instead of its authored kind
    #[serde(default)]
    pub kind: Option<NodeKind>,
    /// Where to continue once every option under this prompt was chosen
    #[serde(default)]
    pub exhausted_exit: Option<NodeId>,
}

impl NodeOverride {
    pub fn kind(node: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            node: node.into(),
            kind: Some(kind),
            exhausted_exit: None,
        }
    }

    pub fn exhausted_exit(node: impl Into<NodeId>, exit: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            kind: None,
            exhausted_exit: Some(exit.into()),
        }
    }
}

/// On-disk graph format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<LearningNode>,
    #[serde(default)]
    pub overrides: Vec<NodeOverride>,
}

impl GraphDocument {
    pub fn new(nodes: Vec<LearningNode>) -> Self {
        Self {
            nodes,
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, node_override: NodeOverride) -> Self {
        self.overrides.push(node_override);
        self
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
