//! # KrillClaw Core
//!
//! Domain types, error definitions, and the low-level building blocks
//! (byte-level JSON codec, arena allocator) shared by every other crate
//! in the KrillClaw agent runtime.
//!
//! ## Design Philosophy
//!
//! This crate has no I/O. It defines the content-block message model that
//! flows between the agent loop, the LLM client, and the tool dispatcher,
//! plus the two pieces of machinery that keep the framed-transport path
//! allocation-light: key-scoped JSON extraction and a resettable bump
//! allocator. All other crates depend inward on this one.

pub mod arena;
pub mod error;
pub mod json;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use arena::{Arena, ArenaError, Capacity};
pub use error::{ClientError, Error, Result, ToolError, TransportError};
pub use message::{ApiResponse, ContentBlock, Message, Role, StopReason};
pub use provider::{Provider, ToolDef};
pub use tool::ToolOutput;
