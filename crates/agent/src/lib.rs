//! The agent loop — the heart of KrillClaw.
//!
//! Think → act → observe:
//!
//! 1. Truncate the conversation to the token budget
//! 2. Send it to the model
//! 3. If the response carries tool calls: execute them in order,
//!    append the results as one user message, loop
//! 4. Otherwise return (end-turn, max-tokens, or the iteration cap)
//!
//! A fingerprint ring over recent tool calls catches the model looping
//! on an identical call and replaces the third and later repeats with
//! an error observation instead of executing them again.

pub mod context;
pub mod react;
pub mod scheduler;

pub use context::ContextWindow;
pub use react::{Agent, TurnOutcome, MAX_ITERATIONS};
pub use scheduler::Scheduler;
