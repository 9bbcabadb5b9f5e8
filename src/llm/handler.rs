//! AI turn handlers: the black-box boundary the engine hands free text to

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{LessonError, Result};
use crate::core::types::Role;
use crate::llm::client::{ChatRole, ChatTurn, LlmClient};
use crate::llm::context::LessonContext;
use crate::llm::reply::{AiReply, CONTINUE_MARKER};

/// One learner message plus where they are in the lesson
#[derive(Debug, Clone, PartialEq)]
pub struct AiTurnRequest {
    pub text: String,
    pub context: LessonContext,
}

/// Produces a reply to learner free text.
///
/// Implementations must be cancel-safe: the session drops the future when
/// the learner moves on.
#[async_trait]
pub trait AiTurnHandler: Send + Sync {
    async fn send(&self, request: AiTurnRequest) -> Result<AiReply>;
}

const DEFAULT_INSTRUCTIONS: &str = "You are a patient tutor sitting beside an authored lesson. \
Answer the learner's question briefly, in plain language, using short paragraphs separated by \
blank lines. If the question is answered and the learner should return to the lesson, end your \
reply with";

/// Handler backed by a hosted LLM
pub struct LlmTurnHandler {
    client: LlmClient,
    instructions: String,
}

impl LlmTurnHandler {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            instructions: format!("{} {}", DEFAULT_INSTRUCTIONS, CONTINUE_MARKER),
        }
    }

    /// Replace the tutor persona. The text should still explain the
    /// continuation marker.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn system_prompt(&self, context: &LessonContext) -> String {
        let header = context.header();
        if header.is_empty() {
            self.instructions.clone()
        } else {
            format!("{}\n\n{}", self.instructions, header)
        }
    }
}

/// Chat turns for one AI request.
///
/// Lesson lines are voiced by the assistant and consecutive lines from the
/// same side are merged, so roles alternate. Leading assistant turns are
/// dropped (the system prompt already carries the current lesson text) and
/// the learner's question always closes the conversation.
pub fn conversation(request: &AiTurnRequest) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = Vec::new();
    for (role, text) in &request.context.recent_lines {
        let role = match role {
            Role::Learner => ChatRole::User,
            Role::Narrator | Role::Assistant => ChatRole::Assistant,
        };
        if turns.is_empty() && role == ChatRole::Assistant {
            continue;
        }
        push_merged(&mut turns, role, text);
    }

    let asked = turns
        .last()
        .is_some_and(|turn| turn.role == ChatRole::User && turn.content.ends_with(&request.text));
    if !asked {
        push_merged(&mut turns, ChatRole::User, &request.text);
    }
    turns
}

fn push_merged(turns: &mut Vec<ChatTurn>, role: ChatRole, text: &str) {
    match turns.last_mut() {
        Some(last) if last.role == role => {
            last.content.push_str("\n\n");
            last.content.push_str(text);
        }
        _ => turns.push(ChatTurn {
            role,
            content: text.to_string(),
        }),
    }
}

#[async_trait]
impl AiTurnHandler for LlmTurnHandler {
    async fn send(&self, request: AiTurnRequest) -> Result<AiReply> {
        let system = self.system_prompt(&request.context);
        let turns = conversation(&request);
        tracing::debug!(model = self.client.model(), turns = turns.len(), "sending AI turn");
        let raw = self.client.complete(&system, &turns).await?;
        Ok(AiReply::from_raw(&raw))
    }
}

/// Handler that replays queued replies. Used offline and in tests.
#[derive(Default)]
pub struct ScriptedTurnHandler {
    replies: Mutex<VecDeque<std::result::Result<AiReply, String>>>,
    fallback: Option<AiReply>,
    latency: Duration,
    call_count: AtomicU32,
    requests: Mutex<Vec<AiTurnRequest>>,
}

impl ScriptedTurnHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    pub fn with_reply(self, reply: AiReply) -> Self {
        self.push(Ok(reply));
        self
    }

    /// Queue a reply given as raw model output, marker included
    pub fn with_raw_reply(self, raw: &str) -> Self {
        self.with_reply(AiReply::from_raw(raw))
    }

    /// Queue a failed call
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    /// Reply used once the queue is empty
    pub fn with_fallback(mut self, reply: AiReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Simulated network latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<AiTurnRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn push(&self, entry: std::result::Result<AiReply, String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(entry);
        }
    }
}

#[async_trait]
impl AiTurnHandler for ScriptedTurnHandler {
    async fn send(&self, request: AiTurnRequest) -> Result<AiReply> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LessonError::Llm(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LessonError::Llm("no scripted reply left".into())),
        }
    }
}
