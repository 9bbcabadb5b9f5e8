//! Offline checks that catch authored-content bugs before learners do

use derive_more::Display;

use crate::core::types::{NodeId, NodeKind};
use crate::graph::store::GraphStore;

/// A data problem in the loaded graph. Never fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum GraphIssue {
    #[display(fmt = "node {} lists unknown successor {}", node, missing)]
    UnresolvedSuccessor { node: NodeId, missing: NodeId },

    #[display(fmt = "override for {} refers to unknown node {}", node, missing)]
    UnresolvedOverride { node: NodeId, missing: NodeId },

    /// Options share no successor and no exit override exists, so an
    /// exhausted prompt falls back to the first option's path
    #[display(fmt = "prompt {} has no common exit once its options are exhausted", prompt)]
    AmbiguousExhaustedExit { prompt: NodeId },
}

pub(crate) fn check(store: &GraphStore) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    for node in store.nodes() {
        for successor in &node.successors {
            if !store.contains(successor) {
                issues.push(GraphIssue::UnresolvedSuccessor {
                    node: node.id.clone(),
                    missing: successor.clone(),
                });
            }
        }

        let is_prompt = store.effective_kind(node) == NodeKind::BranchPrompt;
        if is_prompt
            && !node.successors.is_empty()
            && store.exhausted_exit(&node.id).is_none()
            && store.common_successor(node).is_none()
        {
            issues.push(GraphIssue::AmbiguousExhaustedExit {
                prompt: node.id.clone(),
            });
        }
    }

    for node_override in store.overrides() {
        let targets = std::iter::once(&node_override.node).chain(node_override.exhausted_exit.as_ref());
        for target in targets {
            if !store.contains(target) {
                issues.push(GraphIssue::UnresolvedOverride {
                    node: node_override.node.clone(),
                    missing: target.clone(),
                });
            }
        }
    }

    issues
}
