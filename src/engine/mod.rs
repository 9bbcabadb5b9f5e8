//! Traversal engine: walks the authored graph and interleaves AI turns
//!
//! `machine::Engine` is a synchronous, single-writer state machine. Every
//! operation mutates `TraversalState` and returns the `Effect`s a driver
//! must perform (sleep, call the AI, cancel). `session::SessionHandle` is
//! the tokio driver that owns one engine per chat session.

pub mod command;
pub mod machine;
pub mod session;
pub mod state;

pub use machine::{Effect, Engine};
pub use session::SessionHandle;
pub use state::{
    ChoiceMenu, ChoiceView, Interrupted, PauseStage, Phase, SessionSnapshot, Step, Ticket,
    TraversalState,
};
