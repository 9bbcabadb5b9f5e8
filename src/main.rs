//! Lesson Chat - Entry Point
//!
//! Terminal front end for a lesson session. Loads the delivery config and
//! the learning graph, spawns a session, prints transcript entries as they
//! are delivered and forwards learner input.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::watch;

use lesson_chat::core::config::DeliveryConfig;
use lesson_chat::core::error::Result;
use lesson_chat::core::types::{NodeId, Role};
use lesson_chat::engine::{SessionHandle, SessionSnapshot};
use lesson_chat::graph::{GraphDocument, GraphStore};
use lesson_chat::llm::{AiReply, AiTurnHandler, LlmClient, LlmTurnHandler, ScriptedTurnHandler};
use lesson_chat::transcript::DeliveredItem;

#[derive(Parser, Debug)]
#[command(name = "lesson-chat", about = "Work through an authored lesson as a chat")]
struct Args {
    /// Learning graph document (JSON)
    #[arg(long, default_value = "data/demo_lesson.json")]
    graph: PathBuf,

    /// Delivery config (TOML); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node to start at instead of the graph's entry node
    #[arg(long)]
    start: Option<String>,

    /// Reading-speed multiplier, overrides the config
    #[arg(long)]
    speed: Option<f64>,

    /// Simulated viewport height in points; 0 never pauses
    #[arg(long, default_value_t = 0.0)]
    viewport_height: f32,

    /// Never call the LLM, even when LLM_API_KEY is set
    #[arg(long)]
    offline: bool,

    /// Text file replacing the built-in tutor instructions
    #[arg(long)]
    tutor_prompt: Option<PathBuf>,
}

const OFFLINE_REPLY: &str = "I can't answer questions right now because I'm offline. \
Type c to carry on with the lesson.";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lesson_chat=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DeliveryConfig::load(path)?,
        None => DeliveryConfig::default(),
    };
    if let Some(speed) = args.speed {
        config = config.with_speed(speed);
    }
    config.validate()?;

    let document = GraphDocument::load(&args.graph)?;
    let graph = Arc::new(GraphStore::new());
    let issues = graph.load(document)?;
    if !issues.is_empty() {
        tracing::warn!(count = issues.len(), "learning graph has data issues");
    }

    let instructions = match &args.tutor_prompt {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };
    let ai = build_ai_handler(args.offline, instructions);

    let rt = Runtime::new()?;
    rt.block_on(run(args, graph, ai, config))
}

fn build_ai_handler(offline: bool, instructions: Option<String>) -> Arc<dyn AiTurnHandler> {
    if !offline {
        match LlmClient::from_env() {
            Ok(client) => {
                tracing::info!(model = client.model(), "using LLM for free-text questions");
                let handler = LlmTurnHandler::new(client);
                return Arc::new(match instructions {
                    Some(text) => handler.with_instructions(text.trim()),
                    None => handler,
                });
            }
            Err(_) => tracing::warn!("LLM_API_KEY not set - answering questions offline"),
        }
    }
    Arc::new(ScriptedTurnHandler::new().with_fallback(AiReply::new(OFFLINE_REPLY, false)))
}

async fn run(
    args: Args,
    graph: Arc<GraphStore>,
    ai: Arc<dyn AiTurnHandler>,
    config: DeliveryConfig,
) -> Result<()> {
    let session = SessionHandle::spawn(graph, ai, config);
    session.report_scroll_state(true, args.viewport_height)?;
    session.start(args.start.map(NodeId::from))?;

    println!("\n=== LESSON CHAT ===");
    println!("  <number>   - Pick an offered option");
    println!("  c          - Continue (after a pause or a question)");
    println!("  undo       - Remove your last question and its answer");
    println!("  /jump <id> - Jump to a lesson step");
    println!("  q          - Quit");
    println!("  <any text> - Ask the tutor a question");
    println!();

    let mut updates = session.subscribe();
    let mut view = TerminalView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                view.render(&updates.borrow_and_update())?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "q" || input == "quit" {
                    break;
                }
                handle_input(&session, &updates, input)?;
            }
        }
    }

    session.shutdown().await;
    println!("\nGoodbye!");
    Ok(())
}

fn handle_input(
    session: &SessionHandle,
    updates: &watch::Receiver<SessionSnapshot>,
    input: &str,
) -> Result<()> {
    if input == "c" || input == "continue" {
        return session.user_requested_continue();
    }
    if input == "undo" {
        return session.undo_last_exchange();
    }

    if let Ok(n) = input.parse::<usize>() {
        let choice = {
            let snapshot = updates.borrow();
            n.checked_sub(1)
                .and_then(|i| snapshot.offered_choices.get(i))
                .map(|choice| choice.id.clone())
        };
        return match choice {
            Some(option) => session.choose_branch(option),
            None => {
                println!("No option {} on offer.", n);
                Ok(())
            }
        };
    }

    session.handle_free_text(input)
}

/// Prints only what changed since the last snapshot
#[derive(Default)]
struct TerminalView {
    printed: usize,
    title_shown: bool,
    offered: Vec<NodeId>,
    paused: bool,
}

impl TerminalView {
    fn render(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        let mut out = io::stdout().lock();

        if !self.title_shown {
            if let Some(title) = &snapshot.module_title {
                writeln!(out, "## {}", title)?;
                if let Some(description) = &snapshot.module_description {
                    writeln!(out, "   {}", description)?;
                }
                writeln!(out)?;
                self.title_shown = true;
            }
        }

        if snapshot.transcript.len() < self.printed {
            writeln!(out, "  (removed your last question and its answer)")?;
            self.printed = snapshot.transcript.len();
        }
        for item in &snapshot.transcript[self.printed..] {
            writeln!(out, "{}", format_item(item))?;
        }
        self.printed = snapshot.transcript.len();

        let offered: Vec<NodeId> = snapshot.offered_choices.iter().map(|c| c.id.clone()).collect();
        if offered != self.offered && !offered.is_empty() {
            for (i, choice) in snapshot.offered_choices.iter().enumerate() {
                writeln!(out, "  [{}] {}", i + 1, choice.text)?;
            }
        }
        self.offered = offered;

        if snapshot.is_paused && !self.paused {
            writeln!(out, "  -- more below, type c to continue --")?;
        }
        self.paused = snapshot.is_paused;

        out.flush()
    }
}

fn format_item(item: &DeliveredItem) -> String {
    match item.role {
        Role::Learner => format!("> {}", item.text),
        Role::Narrator => item.text.clone(),
        Role::Assistant => format!("[tutor] {}", item.text),
    }
}
