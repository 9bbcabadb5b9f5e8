//! Gather lesson context for AI prompts
//!
//! The AI answers as a side channel next to the authored lesson, so it
//! needs to know where the learner is: the module, the node last
//! delivered, and the last few lines of conversation.

use crate::core::types::{NodeId, Role};
use crate::transcript::DeliveredItem;

/// Maximum transcript lines carried into a prompt
const MAX_RECENT_LINES: usize = 6;

/// Lesson context for AI prompts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonContext {
    /// Title of the module being taught
    pub module_title: Option<String>,
    /// Node the learner last reached in the authored graph
    pub current_node: Option<NodeId>,
    /// Authored text of that node
    pub current_content: Option<String>,
    /// Recent transcript lines, oldest first
    pub recent_lines: Vec<(Role, String)>,
}

impl LessonContext {
    /// Create an empty context
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context from session state
    ///
    /// Only the trailing `MAX_RECENT_LINES` entries of `recent` are kept.
    pub fn new(
        module_title: Option<String>,
        current_node: Option<NodeId>,
        current_content: Option<String>,
        recent: &[DeliveredItem],
    ) -> Self {
        let mut context = Self {
            module_title,
            current_node,
            current_content,
            recent_lines: Vec::new(),
        };
        for item in recent {
            context.add_line(item.role, item.text.clone());
        }
        context
    }

    /// Add a transcript line, keeping only the most recent ones
    pub fn add_line(&mut self, role: Role, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.recent_lines.push((role, text));
        if self.recent_lines.len() > MAX_RECENT_LINES {
            self.recent_lines.remove(0);
        }
    }

    /// Where the learner is in the lesson, without the conversation
    pub fn header(&self) -> String {
        let mut s = String::new();

        if let Some(title) = &self.module_title {
            s.push_str(&format!("Module: {}\n", title));
        }
        if let Some(node) = &self.current_node {
            s.push_str(&format!("Lesson position: {}\n", node));
        }
        if let Some(content) = &self.current_content {
            s.push_str(&format!("Current lesson text: {}\n", content));
        }
        s
    }

    /// Generate a text summary of the context, conversation included
    pub fn summary(&self) -> String {
        let mut s = self.header();

        if !self.recent_lines.is_empty() {
            s.push_str("\nRecent conversation:\n");
            for (role, text) in &self.recent_lines {
                let speaker = match role {
                    Role::Learner => "Learner",
                    Role::Narrator => "Lesson",
                    Role::Assistant => "Tutor",
                };
                s.push_str(&format!("- {}: {}\n", speaker, text));
            }
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        let ctx = LessonContext::empty();
        assert!(ctx.summary().is_empty());
    }

    #[test]
    fn test_context_summary() {
        let ctx = LessonContext::new(
            Some("Cells".into()),
            Some(NodeId::from("3.2")),
            Some("Mitochondria make ATP.".into()),
            &[
                DeliveredItem::narrator("Mitochondria make ATP."),
                DeliveredItem::learner("What is ATP?"),
            ],
        );

        let summary = ctx.summary();
        assert!(summary.contains("Module: Cells"));
        assert!(summary.contains("Lesson position: 3.2"));
        assert!(summary.contains("- Learner: What is ATP?"));
        assert!(summary.contains("- Lesson: Mitochondria make ATP."));
    }

    #[test]
    fn test_line_limit_and_blank_lines() {
        let mut ctx = LessonContext::empty();
        ctx.add_line(Role::Narrator, "   ");
        for i in 0..10 {
            ctx.add_line(Role::Learner, format!("Line {}", i));
        }

        assert_eq!(ctx.recent_lines.len(), MAX_RECENT_LINES);
        assert_eq!(ctx.recent_lines[0].1, "Line 4");
        assert_eq!(ctx.recent_lines.last().unwrap().1, "Line 9");
    }
}
