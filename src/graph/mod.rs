//! Authored learning graph: nodes, per-node overrides, and the shared store
//!
//! The graph is loaded once and is read-only afterwards, so one
//! `Arc<GraphStore>` can serve every chat session.

pub mod node;
pub mod store;
pub mod validate;

pub use node::{GraphDocument, LearningNode, NodeOverride};
pub use store::GraphStore;
pub use validate::GraphIssue;
