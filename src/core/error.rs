use thiserror::Error;

use crate::core::types::NodeId;

#[derive(Error, Debug)]
pub enum LessonError {
    #[error("Invalid payload for node {node}: {reason}")]
    InvalidPayload { node: NodeId, reason: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Graph load error: {0}")]
    GraphLoad(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LessonError>;
