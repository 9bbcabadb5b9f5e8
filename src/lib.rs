//! Lesson Chat - conversational delivery of branching, authored lessons
//!
//! An authored learning graph is delivered as a paced chat. Learners pick
//! branch options, and any free text they type becomes an AI turn that
//! pauses the lesson and can hand control back to it afterwards.

pub mod core;
pub mod engine;
pub mod graph;
pub mod ledger;
pub mod llm;
pub mod pacer;
pub mod transcript;

pub use crate::core::config::DeliveryConfig;
pub use crate::core::error::{LessonError, Result};
pub use crate::core::types::{NodeId, NodeKind, Role};
pub use crate::engine::{Engine, SessionHandle, SessionSnapshot};
pub use crate::graph::{GraphDocument, GraphStore, LearningNode};
