//! The traversal state machine
//!
//! All session mutations go through `Engine`. Operations never block and
//! never fail outward: data problems are logged, learner-visible problems
//! become narrator lines, and anything that has to wait is returned as an
//! `Effect` for the driver to carry out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::DeliveryConfig;
use crate::core::error::Result;
use crate::core::types::{NodeId, NodeKind};
use crate::engine::command::{self, DebugCommand};
use crate::engine::state::{
    ChoiceMenu, ChoiceView, Interrupted, PauseStage, Phase, SessionSnapshot, Step, Ticket,
    TraversalState,
};
use crate::graph::{GraphStore, LearningNode};
use crate::ledger::ChoiceLedger;
use crate::llm::{AiReply, AiTurnRequest, LessonContext};
use crate::pacer::{self, ContentShape, Viewport};
use crate::transcript::{DeliveredItem, Payload};

/// Transcript entries handed to the AI as conversation context
const AI_CONTEXT_LINES: usize = 6;

/// Work the driver performs on the engine's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Drop whatever timer or AI call is outstanding
    CancelPending,
    /// Call `Engine::on_timer(ticket)` after `delay`
    Schedule { ticket: Ticket, delay: Duration },
    /// Send `request` to the AI handler and report back through
    /// `Engine::on_ai_reply(ticket, ..)`
    CallAi { ticket: Ticket, request: AiTurnRequest },
}

/// Single-writer orchestrator for one chat session
pub struct Engine {
    graph: Arc<GraphStore>,
    config: DeliveryConfig,
    state: TraversalState,
    ledger: ChoiceLedger,
    last_ticket: Ticket,
}

impl Engine {
    pub fn new(graph: Arc<GraphStore>, config: DeliveryConfig) -> Self {
        if let Err(error) = config.validate() {
            tracing::warn!(%error, "delivery config out of range, clamping at use");
        }
        Self {
            graph,
            config,
            state: TraversalState::default(),
            ledger: ChoiceLedger::new(),
            last_ticket: 0,
        }
    }

    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    pub fn ledger(&self) -> &ChoiceLedger {
        &self.ledger
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// Change the learner's reading speed. Applies from the next delay on.
    pub fn set_speed(&mut self, speed_multiplier: f64) {
        if speed_multiplier > 0.0 {
            self.config.speed_multiplier = speed_multiplier;
        } else {
            tracing::warn!(speed_multiplier, "ignoring non-positive reading speed");
        }
    }

    /// What the UI should currently show
    pub fn snapshot(&self) -> SessionSnapshot {
        let offered_choices = self
            .state
            .offered_choices()
            .iter()
            .map(|id| ChoiceView {
                id: id.clone(),
                text: self
                    .graph
                    .lookup(id)
                    .map(|node| node.content.clone())
                    .unwrap_or_default(),
            })
            .collect();

        SessionSnapshot {
            transcript: self.state.transcript.items().to_vec(),
            offered_choices,
            is_paused: self.state.is_paused(),
            is_typing: self.state.is_typing(),
            is_awaiting_ai: self.state.is_awaiting_ai(),
            module_title: self.state.module_title.clone(),
            module_description: self.state.module_description.clone(),
            current_node: self.state.current_node.clone(),
        }
    }

    // =====================================================================
    //  Learner / UI operations
    // =====================================================================

    /// Begin a fresh session at `from`, or at the graph's entry node.
    ///
    /// Leading module title and description nodes seed the header fields
    /// instead of being delivered.
    pub fn start(&mut self, from: Option<NodeId>) -> Vec<Effect> {
        let mut out = Vec::new();
        self.cancel_pending(&mut out);
        self.state.reset();
        self.ledger.reset();

        let graph = Arc::clone(&self.graph);
        let Some(mut target) = from.or_else(|| graph.entry().cloned()) else {
            tracing::warn!("cannot start a session on an empty graph");
            return out;
        };

        // Bounded so a header cycle cannot spin forever.
        for _ in 0..=graph.len() {
            let Some(node) = graph.lookup(&target) else {
                break;
            };
            let kind = graph.effective_kind(node);
            if !kind.is_module_header() {
                break;
            }
            let header = Some(node.content.clone());
            if kind == NodeKind::ModuleTitle {
                self.state.module_title = header;
            } else {
                self.state.module_description = header;
            }
            match node.first_successor() {
                Some(next) => target = next.clone(),
                None => {
                    self.state.current_node = Some(target);
                    return out;
                }
            }
        }

        tracing::info!(start = %target, title = ?self.state.module_title, "session start");
        self.advance_to(&target, false, false, &mut out);
        out
    }

    /// Deliver `target` next, preempting any pending delivery.
    pub fn advance(&mut self, target: &NodeId) -> Vec<Effect> {
        let mut out = Vec::new();
        let typing = self.state.is_typing();
        self.advance_to(target, false, typing, &mut out);
        out
    }

    /// The learner picked one of the offered options.
    pub fn choose_branch(&mut self, option: &NodeId) -> Vec<Effect> {
        let mut out = Vec::new();

        let prompt = match &self.state.phase {
            Phase::AwaitingChoice(menu) if menu.options.contains(option) => menu.prompt.clone(),
            _ => {
                tracing::debug!(option = %option, "choice not on offer, ignoring");
                return out;
            }
        };

        // Recorded before anything else so a repeated tap finds it taken.
        self.ledger.record(&prompt, option);
        self.state.phase = Phase::Idle;

        let graph = Arc::clone(&self.graph);
        let Some(node) = graph.lookup(option) else {
            tracing::warn!(option = %option, "chosen option missing from graph");
            return out;
        };

        self.append(DeliveredItem::learner(node.content.clone()));
        self.state.current_node = Some(option.clone());
        tracing::debug!(prompt = %prompt, option = %option, "branch chosen");

        if let Some(next) = node.first_successor() {
            self.advance_to(next, false, false, &mut out);
        }
        out
    }

    /// Deliver whatever the last pause held back.
    pub fn resume_from_pause(&mut self) -> Vec<Effect> {
        let mut out = Vec::new();
        if !self.state.is_paused() {
            return out;
        }
        let Phase::Paused { node, stage } = std::mem::take(&mut self.state.phase) else {
            return out;
        };

        tracing::debug!(node = %node, ?stage, "resuming from pause");
        match stage {
            PauseStage::BeforeContent => self.advance_to(&node, true, false, &mut out),
            PauseStage::BeforeChoices => self.reveal_choices(&node, false, &mut out),
        }
        out
    }

    /// Explicit "continue" from the learner.
    ///
    /// Resumes a pause, or picks the lesson back up after an AI detour
    /// left the session idle.
    pub fn user_requested_continue(&mut self) -> Vec<Effect> {
        match self.state.phase {
            Phase::Paused { .. } => self.resume_from_pause(),
            Phase::Idle => {
                let mut out = Vec::new();
                self.resume_graph(None, &mut out);
                out
            }
            _ => Vec::new(),
        }
    }

    /// Latest viewport report from the scroll observer.
    ///
    /// A pause ends here only when the learner is at the bottom of a
    /// viewport that now has room for what was held back. Scrolling up or a
    /// still-full viewport leaves it for an explicit continue.
    pub fn report_scroll_state(&mut self, is_at_bottom: bool, viewport_height: f32) -> Vec<Effect> {
        self.state.viewport = Viewport {
            height: viewport_height,
            is_at_bottom,
        };

        let room_again = match &self.state.phase {
            Phase::Paused { node, stage } => is_at_bottom && self.held_back_fits(node, *stage),
            _ => false,
        };
        if room_again {
            tracing::debug!(viewport_height, "viewport has room again");
            return self.resume_from_pause();
        }
        Vec::new()
    }

    /// Learner typed something.
    ///
    /// Commands run immediately; anything else goes to the AI. Authored
    /// delivery stops until the AI turn finishes.
    pub fn handle_free_text(&mut self, text: &str) -> Vec<Effect> {
        let mut out = Vec::new();
        let text = text.trim();
        if text.is_empty() {
            return out;
        }

        if let Some(parsed) = command::parse(text) {
            self.run_command(parsed, &mut out);
            return out;
        }

        if self.state.is_awaiting_ai() {
            tracing::warn!("AI turn already in flight, dropping learner message");
            return out;
        }

        let interrupted = self.cancel_pending(&mut out).into_interrupted();
        self.append(DeliveredItem::learner(text));

        let ticket = self.next_ticket();
        let request = AiTurnRequest {
            text: text.to_string(),
            context: self.lesson_context(),
        };
        tracing::debug!(ticket, "requesting AI turn");
        self.state.phase = Phase::AwaitingAi {
            ticket,
            interrupted,
        };
        out.push(Effect::CallAi { ticket, request });
        out
    }

    /// Remove the last (learner, assistant) exchange from the transcript.
    ///
    /// Cancels outstanding timers and AI calls first. Whatever authored
    /// delivery they held waits as a menu or a pause; a pause or an open
    /// choice menu is left in place.
    pub fn undo_last_exchange(&mut self) -> Vec<Effect> {
        let mut out = Vec::new();
        if self.state.phase.has_inflight_work() {
            let interrupted = self.cancel_pending(&mut out).into_interrupted();
            self.restore_interrupted(interrupted);
        }

        if self.state.transcript.undo_last_exchange() {
            tracing::info!("undid last exchange");
        } else {
            tracing::debug!("nothing to undo");
        }
        out
    }

    // =====================================================================
    //  Driver callbacks
    // =====================================================================

    /// A scheduled delay elapsed.
    pub fn on_timer(&mut self, ticket: Ticket) -> Vec<Effect> {
        let mut out = Vec::new();

        let is_current = matches!(
            &self.state.phase,
            Phase::PendingDelivery { ticket: pending, .. } if *pending == ticket
        );
        if !is_current {
            tracing::debug!(ticket, "stale timer ignored");
            return out;
        }
        let Phase::PendingDelivery { step, .. } = std::mem::take(&mut self.state.phase) else {
            return out;
        };

        match step {
            Step::Advance(target) => self.advance_to(&target, false, true, &mut out),
            Step::RevealChoices(node) => self.reveal_choices(&node, true, &mut out),
            Step::AiParagraph {
                remaining,
                resume,
                interrupted,
            } => self.deliver_ai_paragraph(remaining, resume, interrupted, &mut out),
            Step::ResumeGraph { interrupted } => self.resume_graph(interrupted, &mut out),
        }
        out
    }

    /// The AI call for `ticket` finished.
    pub fn on_ai_reply(&mut self, ticket: Ticket, result: Result<AiReply>) -> Vec<Effect> {
        let mut out = Vec::new();

        let is_current = matches!(
            &self.state.phase,
            Phase::AwaitingAi { ticket: pending, .. } if *pending == ticket
        );
        if !is_current {
            tracing::debug!(ticket, "stale AI reply ignored");
            return out;
        }
        let Phase::AwaitingAi { interrupted, .. } = std::mem::take(&mut self.state.phase) else {
            return out;
        };

        let reply = match result {
            Ok(reply) if !reply.is_empty() => reply,
            Ok(_) => {
                tracing::warn!(ticket, "AI returned an empty reply");
                self.ai_fallback(interrupted);
                return out;
            }
            Err(error) => {
                tracing::warn!(ticket, %error, "AI turn failed");
                self.ai_fallback(interrupted);
                return out;
            }
        };

        let remaining: VecDeque<String> = reply.paragraphs().into();
        tracing::debug!(
            ticket,
            paragraphs = remaining.len(),
            resume = reply.continuation_requested,
            "AI reply received"
        );
        self.schedule(
            Step::AiParagraph {
                remaining,
                resume: reply.continuation_requested,
                interrupted,
            },
            self.config.first_ai_paragraph_delay(),
            &mut out,
        );
        out
    }

    // =====================================================================
    //  Transitions
    // =====================================================================

    fn advance_to(&mut self, target: &NodeId, bypass_pause: bool, typing: bool, out: &mut Vec<Effect>) {
        let graph = Arc::clone(&self.graph);
        let Some(node) = graph.lookup(target) else {
            tracing::warn!(node = %target, "advance target not found in graph");
            return;
        };

        self.cancel_pending(out);

        let kind = graph.effective_kind(node);
        if !bypass_pause && self.pause_needed(&node.content, shape_of(kind), typing) {
            tracing::debug!(node = %target, "pausing before delivery");
            self.state.phase = Phase::Paused {
                node: target.clone(),
                stage: PauseStage::BeforeContent,
            };
            return;
        }

        self.deliver(node, kind, out);
    }

    fn deliver(&mut self, node: &LearningNode, kind: NodeKind, out: &mut Vec<Effect>) {
        let delivered_len = match kind {
            NodeKind::CardCarousel | NodeKind::Media => self.append_payload(node, kind),
            NodeKind::BranchOption => 0,
            _ => self.append(DeliveredItem::narrator(node.content.clone())),
        };
        self.state.current_node = Some(node.id.clone());
        tracing::debug!(node = %node.id, ?kind, "delivered");

        match kind {
            NodeKind::BranchPrompt => {
                let delay = self.reveal_delay(delivered_len);
                self.schedule(Step::RevealChoices(node.id.clone()), delay, out);
            }
            NodeKind::BranchOption => self.encounter_option(node, out),
            _ => {
                if let Some(next) = node.first_successor() {
                    let delay = self.reading_delay(delivered_len);
                    self.schedule(Step::Advance(next.clone()), delay, out);
                }
            }
        }
    }

    /// A BranchOption reached without going through its prompt.
    fn encounter_option(&mut self, option: &LearningNode, out: &mut Vec<Effect>) {
        let parent = structural_parent_of(&option.id);
        if self.ledger.is_chosen(self.config.dedup_scope, &parent, &option.id) {
            tracing::debug!(option = %option.id, "option already taken, skipping past it");
            if let Some(next) = option.first_successor() {
                self.schedule(Step::Advance(next.clone()), Duration::ZERO, out);
            }
            return;
        }

        let delay = self.reveal_delay(0);
        self.schedule(Step::RevealChoices(option.id.clone()), delay, out);
    }

    fn reveal_choices(&mut self, node_id: &NodeId, check_pause: bool, out: &mut Vec<Effect>) {
        let graph = Arc::clone(&self.graph);
        let Some(node) = graph.lookup(node_id) else {
            tracing::warn!(node = %node_id, "choice node not found in graph");
            return;
        };

        let menu = match graph.effective_kind(node) {
            NodeKind::BranchPrompt => {
                let options = self
                    .ledger
                    .available(self.config.dedup_scope, &node.id, &node.successors);
                if options.is_empty() {
                    if node.successors.is_empty() {
                        tracing::warn!(prompt = %node.id, "prompt has no options");
                    } else {
                        self.handle_exhausted(node, out);
                    }
                    return;
                }
                ChoiceMenu {
                    prompt: node.id.clone(),
                    options,
                }
            }
            NodeKind::BranchOption => ChoiceMenu {
                prompt: structural_parent_of(&node.id),
                options: vec![node.id.clone()],
            },
            other => {
                tracing::warn!(node = %node.id, ?other, "choices requested for a non-branch node");
                return;
            }
        };

        // The learner may have scrolled during the delay.
        if check_pause && self.pause_needed("", ContentShape::Options(menu.options.len()), true) {
            tracing::debug!(node = %node_id, "pausing before options");
            self.state.phase = Phase::Paused {
                node: node_id.clone(),
                stage: PauseStage::BeforeChoices,
            };
            return;
        }

        tracing::debug!(prompt = %menu.prompt, options = menu.options.len(), "offering choices");
        self.state.phase = Phase::AwaitingChoice(menu);
    }

    /// Every option under `prompt` is used up: say so and move on.
    fn handle_exhausted(&mut self, prompt: &LearningNode, out: &mut Vec<Effect>) {
        tracing::info!(prompt = %prompt.id, "all options explored");
        let len = self.append(DeliveredItem::narrator(self.config.exhausted_message.clone()));

        match self.graph.exhausted_continuation(prompt) {
            Some(target) => {
                let delay = self.reading_delay(len);
                self.schedule(Step::Advance(target), delay, out);
            }
            None => tracing::warn!(prompt = %prompt.id, "exhausted prompt has nowhere to continue"),
        }
    }

    fn deliver_ai_paragraph(
        &mut self,
        mut remaining: VecDeque<String>,
        resume: bool,
        interrupted: Option<Interrupted>,
        out: &mut Vec<Effect>,
    ) {
        if let Some(paragraph) = remaining.pop_front() {
            let len = self.append(DeliveredItem::assistant(paragraph));
            if !remaining.is_empty() {
                let delay = self.ai_paragraph_delay(len);
                self.schedule(
                    Step::AiParagraph {
                        remaining,
                        resume,
                        interrupted,
                    },
                    delay,
                    out,
                );
                return;
            }
        }

        if resume {
            self.schedule(
                Step::ResumeGraph { interrupted },
                self.config.ai_settle_delay(),
                out,
            );
        } else {
            self.restore_interrupted(interrupted);
        }
    }

    /// Continue the authored lesson from where the learner left it.
    fn resume_graph(&mut self, interrupted: Option<Interrupted>, out: &mut Vec<Effect>) {
        match interrupted {
            Some(Interrupted::Choices(menu)) => {
                let options = self
                    .ledger
                    .available(self.config.dedup_scope, &menu.prompt, &menu.options);
                if !options.is_empty() {
                    self.state.phase = Phase::AwaitingChoice(ChoiceMenu {
                        prompt: menu.prompt,
                        options,
                    });
                    return;
                }
            }
            Some(
                Interrupted::Advance(node)
                | Interrupted::Paused {
                    node,
                    stage: PauseStage::BeforeContent,
                },
            ) => return self.advance_to(&node, false, false, out),
            Some(
                Interrupted::Reveal(node)
                | Interrupted::Paused {
                    node,
                    stage: PauseStage::BeforeChoices,
                },
            ) => return self.reveal_choices(&node, true, out),
            None => {}
        }

        let Some(current) = self.state.current_node.clone() else {
            return;
        };
        let graph = Arc::clone(&self.graph);
        let Some(node) = graph.lookup(&current) else {
            tracing::warn!(node = %current, "current node not found in graph");
            return;
        };

        let kind = graph.effective_kind(node);
        let exhausted_prompt = kind == NodeKind::BranchPrompt
            && !node.successors.is_empty()
            && self
                .ledger
                .available(self.config.dedup_scope, &node.id, &node.successors)
                .is_empty();
        if exhausted_prompt {
            // Already acknowledged when the last option went.
            match graph.exhausted_continuation(node) {
                Some(target) => self.advance_to(&target, false, false, out),
                None => tracing::debug!(prompt = %current, "exhausted prompt has nowhere to continue"),
            }
            return;
        }

        let untaken_option = kind == NodeKind::BranchOption
            && !self.ledger.is_chosen(
                self.config.dedup_scope,
                &structural_parent_of(&current),
                &current,
            );

        if kind == NodeKind::BranchPrompt || untaken_option {
            self.reveal_choices(&current, true, out);
        } else if let Some(next) = node.first_successor() {
            self.advance_to(next, false, false, out);
        }
    }

    fn run_command(
        &mut self,
        parsed: std::result::Result<DebugCommand, command::CommandError>,
        out: &mut Vec<Effect>,
    ) {
        match parsed {
            Ok(DebugCommand::Jump(target)) => {
                if self.graph.contains(&target) {
                    tracing::info!(node = %target, "jump command");
                    let typing = self.state.is_typing();
                    self.advance_to(&target, false, typing, out);
                } else {
                    self.append(DeliveredItem::narrator(format!(
                        "There is no lesson step '{}'.",
                        target
                    )));
                }
            }
            Err(error) => {
                tracing::debug!(%error, "invalid command");
                self.append(DeliveredItem::narrator(error.to_string()));
            }
        }
    }

    // =====================================================================
    //  Helpers
    // =====================================================================

    fn next_ticket(&mut self) -> Ticket {
        self.last_ticket += 1;
        self.last_ticket
    }

    fn schedule(&mut self, step: Step, delay: Duration, out: &mut Vec<Effect>) {
        let ticket = self.next_ticket();
        self.state.phase = Phase::PendingDelivery { ticket, step };
        out.push(Effect::Schedule { ticket, delay });
    }

    /// Leave the current phase, telling the driver to drop held work.
    fn cancel_pending(&mut self, out: &mut Vec<Effect>) -> Phase {
        let previous = std::mem::take(&mut self.state.phase);
        if previous.has_inflight_work() {
            out.push(Effect::CancelPending);
        }
        previous
    }

    fn restore_interrupted(&mut self, interrupted: Option<Interrupted>) {
        self.state.phase = interrupted.map_or(Phase::Idle, Interrupted::into_waiting_phase);
    }

    fn ai_fallback(&mut self, interrupted: Option<Interrupted>) {
        self.append(DeliveredItem::narrator(self.config.ai_fallback_message.clone()));
        self.restore_interrupted(interrupted);
    }

    /// Append a transcript entry, skipping empty text. Returns the
    /// delivered character count.
    fn append(&mut self, item: DeliveredItem) -> usize {
        if item.text.trim().is_empty() && item.payload.is_none() {
            return 0;
        }
        let len = item.text.chars().count();
        self.state.transcript.push(item);
        len
    }

    fn append_payload(&mut self, node: &LearningNode, kind: NodeKind) -> usize {
        match Payload::parse(&node.id, kind, &node.content) {
            Ok(payload) => self.append(DeliveredItem::structured(payload)),
            Err(error) => {
                tracing::warn!(%error, "rendering payload as plain text");
                self.append(DeliveredItem::narrator(node.content.clone()))
            }
        }
    }

    fn reading_delay(&self, content_len: usize) -> Duration {
        pacer::compute_delay(content_len, self.config.speed_multiplier)
    }

    fn reveal_delay(&self, content_len: usize) -> Duration {
        self.reading_delay(content_len).max(self.config.option_reveal_floor())
    }

    fn ai_paragraph_delay(&self, content_len: usize) -> Duration {
        let secs = self.reading_delay(content_len).as_secs_f64() * self.config.ai_paragraph_factor();
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Whether the node a pause holds back would now be delivered
    fn held_back_fits(&self, node_id: &NodeId, stage: PauseStage) -> bool {
        let Some(node) = self.graph.lookup(node_id) else {
            return false;
        };
        let kind = self.graph.effective_kind(node);
        match stage {
            PauseStage::BeforeContent => !self.pause_needed(&node.content, shape_of(kind), false),
            PauseStage::BeforeChoices => {
                let count = match kind {
                    NodeKind::BranchPrompt => self
                        .ledger
                        .available(self.config.dedup_scope, &node.id, &node.successors)
                        .len(),
                    _ => 1,
                };
                !self.pause_needed("", ContentShape::Options(count), false)
            }
        }
    }

    fn pause_needed(&self, content: &str, shape: ContentShape, typing: bool) -> bool {
        let layout = &self.config.layout;
        pacer::should_pause(
            content,
            shape,
            self.state.viewport,
            self.state.transcript.recent(layout.recent_window),
            typing,
            layout,
            self.config.pause_fraction,
        )
    }

    fn lesson_context(&self) -> LessonContext {
        let current_content = self
            .state
            .current_node
            .as_ref()
            .and_then(|id| self.graph.lookup(id))
            .filter(|node| !node.kind.has_special_rendering())
            .map(|node| node.content.clone());

        LessonContext::new(
            self.state.module_title.clone(),
            self.state.current_node.clone(),
            current_content,
            self.state.transcript.recent(AI_CONTEXT_LINES),
        )
    }
}

fn shape_of(kind: NodeKind) -> ContentShape {
    match kind {
        NodeKind::CardCarousel => ContentShape::Carousel,
        NodeKind::Media => ContentShape::Media,
        NodeKind::BranchOption => ContentShape::Options(1),
        _ => ContentShape::Text,
    }
}

/// Ledger key for an option reached on its own
fn structural_parent_of(option: &NodeId) -> NodeId {
    option.structural_parent().unwrap_or_else(|| option.clone())
}
