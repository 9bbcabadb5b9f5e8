//! AI side channel: transport, prompt context, reply decoding, turn handlers

pub mod client;
pub mod context;
pub mod handler;
pub mod reply;

pub use client::{ChatRole, ChatTurn, LlmClient};
pub use context::LessonContext;
pub use handler::{conversation, AiTurnHandler, AiTurnRequest, LlmTurnHandler, ScriptedTurnHandler};
pub use reply::AiReply;
