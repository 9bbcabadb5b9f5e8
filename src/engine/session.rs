//! Async driver for one chat session
//!
//! The engine itself is synchronous. `SessionHandle` owns it inside a tokio
//! task, turns its effects into sleeps and AI calls, and publishes a fresh
//! `SessionSnapshot` after every transition. Every operation is a message,
//! so mutations are serialized without locks.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::config::DeliveryConfig;
use crate::core::error::{LessonError, Result};
use crate::core::types::{NodeId, SessionId};
use crate::engine::machine::{Effect, Engine};
use crate::engine::state::{SessionSnapshot, Ticket};
use crate::graph::GraphStore;
use crate::llm::{AiReply, AiTurnHandler};

/// Operations the UI can send to a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Start(Option<NodeId>),
    Advance(NodeId),
    ChooseBranch(NodeId),
    FreeText(String),
    ScrollState { is_at_bottom: bool, viewport_height: f32 },
    Continue,
    Undo,
    SetSpeed(f64),
}

/// Completions posted back by spawned timers and AI calls
#[derive(Debug)]
enum Internal {
    Timer(Ticket),
    AiReply(Ticket, Result<AiReply>),
}

/// Handle to a running session task
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn a session task on the current runtime.
    pub fn spawn(
        graph: Arc<GraphStore>,
        ai: Arc<dyn AiTurnHandler>,
        config: DeliveryConfig,
    ) -> Self {
        let id = SessionId::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::default());

        let actor = SessionActor {
            id,
            engine: Engine::new(Arc::clone(&graph), config),
            graph,
            ai,
            snapshot: snapshot_tx,
            inflight: None,
        };
        let task = tokio::spawn(actor.run(command_rx));

        Self {
            id,
            commands,
            snapshot,
            task,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Start (or restart) at `from`, or at the graph's entry node.
    ///
    /// Waits for the graph to finish loading before anything is delivered.
    pub fn start(&self, from: Option<NodeId>) -> Result<()> {
        self.send(SessionCommand::Start(from))
    }

    pub fn advance(&self, target: NodeId) -> Result<()> {
        self.send(SessionCommand::Advance(target))
    }

    pub fn choose_branch(&self, option: NodeId) -> Result<()> {
        self.send(SessionCommand::ChooseBranch(option))
    }

    pub fn handle_free_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::FreeText(text.into()))
    }

    pub fn report_scroll_state(&self, is_at_bottom: bool, viewport_height: f32) -> Result<()> {
        self.send(SessionCommand::ScrollState {
            is_at_bottom,
            viewport_height,
        })
    }

    pub fn user_requested_continue(&self) -> Result<()> {
        self.send(SessionCommand::Continue)
    }

    pub fn undo_last_exchange(&self) -> Result<()> {
        self.send(SessionCommand::Undo)
    }

    pub fn set_speed(&self, speed_multiplier: f64) -> Result<()> {
        self.send(SessionCommand::SetSpeed(speed_multiplier))
    }

    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| LessonError::SessionClosed)
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that sees every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| LessonError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// Stop the session, dropping any pending delivery or AI call.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(error) = self.task.await {
            if !error.is_cancelled() {
                tracing::error!(session = %self.id, %error, "session task failed");
            }
        }
    }
}

struct SessionActor {
    id: SessionId,
    engine: Engine,
    graph: Arc<GraphStore>,
    ai: Arc<dyn AiTurnHandler>,
    snapshot: watch::Sender<SessionSnapshot>,
    /// The one outstanding timer or AI call
    inflight: Option<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        let (internal_tx, mut internal) = mpsc::unbounded_channel();
        tracing::info!(session = %self.id, "session started");

        loop {
            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
            };
            self.apply(effects, &internal_tx);
            self.publish();
        }

        if let Some(task) = self.inflight.take() {
            task.abort();
        }
        tracing::info!(session = %self.id, "session closed");
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Vec<Effect> {
        match command {
            SessionCommand::Start(from) => {
                if !self.graph.is_loaded() {
                    tracing::debug!(session = %self.id, "waiting for learning graph");
                    self.graph.wait_loaded().await;
                }
                self.engine.start(from)
            }
            SessionCommand::Advance(target) => self.engine.advance(&target),
            SessionCommand::ChooseBranch(option) => self.engine.choose_branch(&option),
            SessionCommand::FreeText(text) => self.engine.handle_free_text(&text),
            SessionCommand::ScrollState {
                is_at_bottom,
                viewport_height,
            } => self.engine.report_scroll_state(is_at_bottom, viewport_height),
            SessionCommand::Continue => self.engine.user_requested_continue(),
            SessionCommand::Undo => self.engine.undo_last_exchange(),
            SessionCommand::SetSpeed(speed) => {
                self.engine.set_speed(speed);
                Vec::new()
            }
        }
    }

    fn handle_internal(&mut self, event: Internal) -> Vec<Effect> {
        match event {
            Internal::Timer(ticket) => self.engine.on_timer(ticket),
            Internal::AiReply(ticket, result) => self.engine.on_ai_reply(ticket, result),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>, internal: &mpsc::UnboundedSender<Internal>) {
        for effect in effects {
            match effect {
                Effect::CancelPending => {
                    if let Some(task) = self.inflight.take() {
                        task.abort();
                    }
                }
                Effect::Schedule { ticket, delay } => {
                    let tx = internal.clone();
                    self.replace_inflight(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Internal::Timer(ticket));
                    }));
                }
                Effect::CallAi { ticket, request } => {
                    let tx = internal.clone();
                    let ai = Arc::clone(&self.ai);
                    self.replace_inflight(tokio::spawn(async move {
                        let result = ai.send(request).await;
                        let _ = tx.send(Internal::AiReply(ticket, result));
                    }));
                }
            }
        }
    }

    fn replace_inflight(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.inflight.replace(task) {
            previous.abort();
        }
    }

    fn publish(&self) {
        let snapshot = self.engine.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
