//! Decode AI replies into display text plus a traversal signal
//!
//! The backend marks "hand control back to the lesson" with a sentinel
//! at the end of the reply. The marker is stripped here so nothing past
//! this boundary ever sees it.

use serde::{Deserialize, Serialize};

/// Sentinel the tutor prompt asks the model to append when the learner
/// should return to the authored lesson
pub const CONTINUE_MARKER: &str = "[[CONTINUE]]";

/// A generated reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiReply {
    pub text: String,
    /// Resume authored traversal once the reply has been delivered
    pub continuation_requested: bool,
}

impl AiReply {
    pub fn new(text: impl Into<String>, continuation_requested: bool) -> Self {
        Self {
            text: text.into(),
            continuation_requested,
        }
    }

    /// Strip the continuation marker from a raw model reply.
    ///
    /// The marker counts only when it ends the reply (trailing whitespace
    /// ignored); stray occurrences elsewhere are removed but ignored.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim_end();
        let continuation_requested = trimmed.ends_with(CONTINUE_MARKER);
        let text = trimmed.replace(CONTINUE_MARKER, "").trim().to_string();
        Self {
            text,
            continuation_requested,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Blank-line separated paragraphs, trimmed, empties dropped
    pub fn paragraphs(&self) -> Vec<String> {
        split_paragraphs(&self.text)
    }
}

/// Split text on blank lines.
///
/// Lines containing only whitespace count as blank; single newlines stay
/// inside their paragraph.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs
}
