//! Core type definitions used throughout the codebase

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an authored learning node.
///
/// Ids use dotted notation where each segment names a branch below its
/// parent, e.g. `"15.2.1"` is an option under prompt `"15.2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id with its last dotted segment removed (`"15.2.1"` -> `"15.2"`).
    ///
    /// Returns `None` for top-level ids.
    pub fn structural_parent(&self) -> Option<NodeId> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| parent)
            .filter(|parent| !parent.is_empty())
            .map(NodeId::new)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Unique identifier for a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of an authored node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Narration,
    BranchPrompt,
    BranchOption,
    CardCarousel,
    Media,
    ModuleTitle,
    ModuleDescription,
}

impl NodeKind {
    /// Kinds whose content is not appended as a plain text entry.
    pub fn has_special_rendering(self) -> bool {
        matches!(self, Self::BranchOption | Self::CardCarousel | Self::Media)
    }

    pub fn is_module_header(self) -> bool {
        matches!(self, Self::ModuleTitle | Self::ModuleDescription)
    }
}

/// Who a transcript entry is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Narrator,
    Assistant,
}

/// Where transcript content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Authored,
    AiGenerated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_parent() {
        assert_eq!(
            NodeId::from("15.2.1").structural_parent(),
            Some(NodeId::from("15.2"))
        );
        assert_eq!(NodeId::from("15.2").structural_parent(), Some(NodeId::from("15")));
        assert_eq!(NodeId::from("15").structural_parent(), None);
    }

    #[test]
    fn test_node_id_display_and_serde() {
        let id = NodeId::from("3.1");
        assert_eq!(id.to_string(), "3.1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"3.1\"");
    }

    #[test]
    fn test_special_rendering_kinds() {
        assert!(NodeKind::Media.has_special_rendering());
        assert!(NodeKind::BranchOption.has_special_rendering());
        assert!(!NodeKind::BranchPrompt.has_special_rendering());
        assert!(NodeKind::ModuleTitle.is_module_header());
    }
}
