//! Session state: the tagged delivery phase plus everything it acts on

use std::collections::VecDeque;

use serde::Serialize;

use crate::core::types::NodeId;
use crate::pacer::Viewport;
use crate::transcript::{DeliveredItem, Transcript};

/// Identifies one scheduled timer or AI call. Completions carrying an
/// older ticket are stale and ignored.
pub type Ticket = u64;

/// Options currently offered under a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceMenu {
    /// Prompt the options belong to; ledger entries are keyed by it
    pub prompt: NodeId,
    pub options: Vec<NodeId>,
}

/// Work waiting on a timer
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Reading delay is over; deliver this node next
    Advance(NodeId),
    /// Delay after a prompt (or a lone option) before options appear
    RevealChoices(NodeId),
    /// Next paragraph of a generated reply
    AiParagraph {
        remaining: VecDeque<String>,
        resume: bool,
        interrupted: Option<Interrupted>,
    },
    /// Settle delay after a reply that hands control back to the lesson
    ResumeGraph { interrupted: Option<Interrupted> },
}

impl Step {
    /// Whether the typing indicator shows while this step waits
    pub fn shows_typing(&self) -> bool {
        !matches!(self, Self::ResumeGraph { .. })
    }
}

/// What a pause interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStage {
    /// The node has not been rendered yet
    BeforeContent,
    /// The prompt is rendered; its options are not
    BeforeChoices,
}

/// Authored delivery set aside by an AI turn
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupted {
    /// Options that were on offer
    Choices(ChoiceMenu),
    /// A node still waiting on its reading delay
    Advance(NodeId),
    /// Options still waiting on their reveal delay
    Reveal(NodeId),
    /// A pause holding this node back
    Paused { node: NodeId, stage: PauseStage },
}

impl Interrupted {
    /// Phase to wait in when the lesson does not carry on by itself.
    ///
    /// Deliveries that were still on a timer come back as a pause, so the
    /// next explicit continue delivers them.
    pub fn into_waiting_phase(self) -> Phase {
        match self {
            Self::Choices(menu) => Phase::AwaitingChoice(menu),
            Self::Advance(node) => Phase::Paused {
                node,
                stage: PauseStage::BeforeContent,
            },
            Self::Reveal(node) => Phase::Paused {
                node,
                stage: PauseStage::BeforeChoices,
            },
            Self::Paused { node, stage } => Phase::Paused { node, stage },
        }
    }
}

/// Delivery phase of a session
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    PendingDelivery { ticket: Ticket, step: Step },
    Paused { node: NodeId, stage: PauseStage },
    AwaitingChoice(ChoiceMenu),
    /// An AI call is in flight; `interrupted` is picked back up once the
    /// turn ends
    AwaitingAi {
        ticket: Ticket,
        interrupted: Option<Interrupted>,
    },
}

impl Phase {
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    pub fn is_typing(&self) -> bool {
        match self {
            Self::PendingDelivery { step, .. } => step.shows_typing(),
            _ => false,
        }
    }

    pub fn is_awaiting_ai(&self) -> bool {
        matches!(self, Self::AwaitingAi { .. })
    }

    pub fn offered_choices(&self) -> &[NodeId] {
        match self {
            Self::AwaitingChoice(menu) => &menu.options,
            _ => &[],
        }
    }

    pub fn pending_node(&self) -> Option<&NodeId> {
        match self {
            Self::Paused { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Whether a driver holds a timer or AI call for this phase
    pub fn has_inflight_work(&self) -> bool {
        matches!(self, Self::PendingDelivery { .. } | Self::AwaitingAi { .. })
    }

    /// The authored work this phase holds, or carries through an AI turn
    pub fn into_interrupted(self) -> Option<Interrupted> {
        match self {
            Self::Idle => None,
            Self::AwaitingChoice(menu) => Some(Interrupted::Choices(menu)),
            Self::Paused { node, stage } => Some(Interrupted::Paused { node, stage }),
            Self::PendingDelivery { step, .. } => match step {
                Step::Advance(node) => Some(Interrupted::Advance(node)),
                Step::RevealChoices(node) => Some(Interrupted::Reveal(node)),
                Step::AiParagraph { interrupted, .. } | Step::ResumeGraph { interrupted } => {
                    interrupted
                }
            },
            Self::AwaitingAi { interrupted, .. } => interrupted,
        }
    }
}

/// Live state of one chat session
#[derive(Debug, Clone, Default)]
pub struct TraversalState {
    /// Node last delivered
    pub current_node: Option<NodeId>,
    pub phase: Phase,
    pub transcript: Transcript,
    pub module_title: Option<String>,
    pub module_description: Option<String>,
    pub viewport: Viewport,
}

impl TraversalState {
    pub fn pending_node(&self) -> Option<&NodeId> {
        self.phase.pending_node()
    }

    pub fn offered_choices(&self) -> &[NodeId] {
        self.phase.offered_choices()
    }

    pub fn is_paused(&self) -> bool {
        self.phase.is_paused()
    }

    pub fn is_typing(&self) -> bool {
        self.phase.is_typing()
    }

    pub fn is_awaiting_ai(&self) -> bool {
        self.phase.is_awaiting_ai()
    }

    /// Back to a fresh session, keeping the last viewport report
    pub(crate) fn reset(&mut self) {
        let viewport = self.viewport;
        *self = Self {
            viewport,
            ..Self::default()
        };
    }
}

/// An offered option as the UI renders it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceView {
    pub id: NodeId,
    pub text: String,
}

/// Everything the UI observes about a session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub transcript: Vec<DeliveredItem>,
    pub offered_choices: Vec<ChoiceView>,
    pub is_paused: bool,
    pub is_typing: bool,
    pub is_awaiting_ai: bool,
    pub module_title: Option<String>,
    pub module_description: Option<String>,
    pub current_node: Option<NodeId>,
}

impl SessionSnapshot {
    /// Transcript texts in order
    pub fn texts(&self) -> Vec<&str> {
        self.transcript.iter().map(|item| item.text.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> ChoiceMenu {
        ChoiceMenu {
            prompt: NodeId::from("2"),
            options: vec![NodeId::from("2.1"), NodeId::from("2.2")],
        }
    }

    #[test]
    fn test_flags_follow_phase() {
        let idle = Phase::Idle;
        assert!(!idle.is_typing() && !idle.is_paused() && !idle.is_awaiting_ai());

        let typing = Phase::PendingDelivery {
            ticket: 1,
            step: Step::Advance(NodeId::from("3")),
        };
        assert!(typing.is_typing());
        assert!(typing.has_inflight_work());

        let settling = Phase::PendingDelivery {
            ticket: 2,
            step: Step::ResumeGraph { interrupted: None },
        };
        assert!(!settling.is_typing());

        let awaiting = Phase::AwaitingAi {
            ticket: 3,
            interrupted: None,
        };
        assert!(awaiting.is_awaiting_ai());
        assert!(!awaiting.is_typing());

        let paused = Phase::Paused {
            node: NodeId::from("4"),
            stage: PauseStage::BeforeContent,
        };
        assert_eq!(paused.pending_node(), Some(&NodeId::from("4")));
    }

    #[test]
    fn test_offered_choices_only_when_awaiting_choice() {
        assert_eq!(Phase::AwaitingChoice(menu()).offered_choices().len(), 2);
        assert!(Phase::Idle.offered_choices().is_empty());
    }

    #[test]
    fn test_interrupted_work_survives_ai_turns() {
        let choices = Some(Interrupted::Choices(menu()));
        assert_eq!(Phase::AwaitingChoice(menu()).into_interrupted(), choices);
        assert_eq!(
            Phase::AwaitingAi {
                ticket: 1,
                interrupted: choices.clone(),
            }
            .into_interrupted(),
            choices
        );
        let paragraph = Phase::PendingDelivery {
            ticket: 2,
            step: Step::AiParagraph {
                remaining: VecDeque::new(),
                resume: true,
                interrupted: choices.clone(),
            },
        };
        assert_eq!(paragraph.into_interrupted(), choices);

        let paused = Phase::Paused {
            node: NodeId::from("4"),
            stage: PauseStage::BeforeContent,
        };
        assert_eq!(
            paused.clone().into_interrupted(),
            Some(Interrupted::Paused {
                node: NodeId::from("4"),
                stage: PauseStage::BeforeContent,
            })
        );
        assert_eq!(Phase::Idle.into_interrupted(), None);
    }

    #[test]
    fn test_pending_delivery_waits_as_pause() {
        let pending = Phase::PendingDelivery {
            ticket: 5,
            step: Step::Advance(NodeId::from("4")),
        };
        let waiting = pending.into_interrupted().unwrap().into_waiting_phase();
        assert_eq!(waiting.pending_node(), Some(&NodeId::from("4")));

        let reveal = Interrupted::Reveal(NodeId::from("2")).into_waiting_phase();
        assert_eq!(
            reveal,
            Phase::Paused {
                node: NodeId::from("2"),
                stage: PauseStage::BeforeChoices,
            }
        );
        assert_eq!(
            Interrupted::Choices(menu()).into_waiting_phase().offered_choices().len(),
            2
        );
    }

    #[test]
    fn test_reset_keeps_viewport() {
        let mut state = TraversalState::default();
        state.viewport = Viewport {
            height: 700.0,
            is_at_bottom: true,
        };
        state.module_title = Some("Cells".into());
        state.transcript.push(DeliveredItem::narrator("Hi"));

        state.reset();
        assert_eq!(state.viewport.height, 700.0);
        assert!(state.module_title.is_none());
        assert!(state.transcript.is_empty());
    }
}
