//! Learner debug commands typed into the chat box

use thiserror::Error;

use crate::core::types::NodeId;

/// Prefix that marks chat input as a command instead of a question
pub const COMMAND_PREFIX: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    /// Continue the lesson from an arbitrary node
    Jump(NodeId),
}

/// Shown to the learner as a narrator line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: /jump <node-id>")]
    JumpUsage,

    #[error("Unknown command '/{0}'. Available: /jump <node-id>")]
    Unknown(String),
}

/// Parse chat input.
///
/// Returns `None` when the text is not a command at all.
pub fn parse(text: &str) -> Option<Result<DebugCommand, CommandError>> {
    let body = text.trim().strip_prefix(COMMAND_PREFIX)?;
    let mut words = body.split_whitespace();
    let name = words.next().unwrap_or_default();

    let parsed = match name.to_lowercase().as_str() {
        "jump" | "goto" => match (words.next(), words.next()) {
            (Some(id), None) => Ok(DebugCommand::Jump(NodeId::from(id))),
            _ => Err(CommandError::JumpUsage),
        },
        _ => Err(CommandError::Unknown(name.to_string())),
    };
    Some(parsed)
}
