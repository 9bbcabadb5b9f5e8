//! Read-only node store shared by every session

use std::sync::OnceLock;

use ahash::AHashMap;
use tokio::sync::watch;

use crate::core::error::{LessonError, Result};
use crate::core::types::{NodeId, NodeKind};
use crate::graph::node::{GraphDocument, LearningNode, NodeOverride};
use crate::graph::validate::{self, GraphIssue};

#[derive(Debug)]
struct GraphData {
    nodes: AHashMap<NodeId, LearningNode>,
    /// Document order; the first entry is the default session start
    order: Vec<NodeId>,
    overrides: AHashMap<NodeId, NodeOverride>,
}

/// Nodes keyed by id, filled exactly once
#[derive(Debug)]
pub struct GraphStore {
    data: OnceLock<GraphData>,
    loaded: watch::Sender<bool>,
}

impl GraphStore {
    /// An empty store; sessions started against it wait for `load`.
    pub fn new() -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            data: OnceLock::new(),
            loaded,
        }
    }

    /// A store loaded from `document` immediately
    pub fn from_document(document: GraphDocument) -> Result<Self> {
        let store = Self::new();
        store.load(document)?;
        Ok(store)
    }

    /// Install the graph and wake everyone waiting on it.
    ///
    /// Duplicate node ids and a second load are errors. Dangling references
    /// are not: they are logged and returned so tooling can report them.
    pub fn load(&self, document: GraphDocument) -> Result<Vec<GraphIssue>> {
        let mut nodes = AHashMap::with_capacity(document.nodes.len());
        let mut order = Vec::with_capacity(document.nodes.len());
        for node in document.nodes {
            if nodes.contains_key(&node.id) {
                return Err(LessonError::GraphLoad(format!("duplicate node id {}", node.id)));
            }
            order.push(node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        let overrides = document
            .overrides
            .into_iter()
            .map(|o| (o.node.clone(), o))
            .collect();

        self.data
            .set(GraphData {
                nodes,
                order,
                overrides,
            })
            .map_err(|_| LessonError::GraphLoad("graph is already loaded".into()))?;

        let issues = self.validate();
        for issue in &issues {
            tracing::warn!(%issue, "graph data issue");
        }
        tracing::info!(nodes = self.len(), issues = issues.len(), "learning graph loaded");

        self.loaded.send_replace(true);
        Ok(issues)
    }

    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }

    /// Resolve once the graph has been loaded.
    pub async fn wait_loaded(&self) {
        let mut rx = self.loaded.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|loaded| *loaded).await;
    }

    pub fn lookup(&self, id: &NodeId) -> Option<&LearningNode> {
        self.data.get()?.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.lookup(id).is_some()
    }

    /// First node in document order
    pub fn entry(&self) -> Option<&NodeId> {
        self.data.get()?.order.first()
    }

    pub fn len(&self) -> usize {
        self.data.get().map_or(0, |data| data.nodes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodes in document order
    pub fn nodes(&self) -> impl Iterator<Item = &LearningNode> + '_ {
        self.data
            .get()
            .into_iter()
            .flat_map(|data| data.order.iter().filter_map(|id| data.nodes.get(id)))
    }

    pub fn overrides(&self) -> impl Iterator<Item = &NodeOverride> + '_ {
        self.data
            .get()
            .into_iter()
            .flat_map(|data| data.overrides.values())
    }

    /// The node's kind after applying any override
    pub fn effective_kind(&self, node: &LearningNode) -> NodeKind {
        self.data
            .get()
            .and_then(|data| data.overrides.get(&node.id))
            .and_then(|o| o.kind)
            .unwrap_or(node.kind)
    }

    pub fn exhausted_exit(&self, prompt: &NodeId) -> Option<&NodeId> {
        self.data
            .get()?
            .overrides
            .get(prompt)?
            .exhausted_exit
            .as_ref()
    }

    /// The first successor, in the first option's order, that every option
    /// under `prompt` leads to.
    pub fn common_successor(&self, prompt: &LearningNode) -> Option<NodeId> {
        let options: Vec<&LearningNode> = prompt
            .successors
            .iter()
            .filter_map(|id| self.lookup(id))
            .collect();
        let (first, rest) = options.split_first()?;

        first
            .successors
            .iter()
            .find(|candidate| rest.iter().all(|o| o.successors.contains(candidate)))
            .cloned()
    }

    /// Where traversal continues once every option under `prompt` is used.
    ///
    /// Override first, then the common successor of all options, then the
    /// first option's first successor.
    pub fn exhausted_continuation(&self, prompt: &LearningNode) -> Option<NodeId> {
        if let Some(exit) = self.exhausted_exit(&prompt.id) {
            return Some(exit.clone());
        }
        if let Some(common) = self.common_successor(prompt) {
            return Some(common);
        }
        prompt
            .first_successor()
            .and_then(|first| self.lookup(first))
            .and_then(|option| option.first_successor())
            .cloned()
    }

    /// Offline consistency checks for authors
    pub fn validate(&self) -> Vec<GraphIssue> {
        validate::check(self)
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
