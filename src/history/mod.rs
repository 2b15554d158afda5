//! History module - the conversation log and its compression engine
//!
//! This module owns the conversation as a parent-linked tree of messages,
//! converts it to provider-neutral prompt format, and keeps it inside the
//! model's context budget.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  add_message   ┌─────────────┐  on_message  ┌─────────────┐
//! │  AgentLoop  │───────────────>│ HistoryLog  │─────────────>│ HistorySink │
//! │             │                │ (msg tree)  │              │ (persist)   │
//! └─────────────┘                └─────────────┘              └─────────────┘
//!        │                              │
//!        │ compress_if_needed           │ active_path / to_provider_messages
//!        ▼                              ▼
//! ┌─────────────┐                ┌─────────────┐
//! │  compress   │                │  Provider   │
//! │ prune+compact│               │   prompt    │
//! └─────────────┘                └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use clawcore::history::{HistoryLog, Message, to_provider_messages};
//!
//! let mut log = HistoryLog::new();
//! log.add_message(Message::system("You are a coding agent.")).unwrap();
//! log.add_message(Message::user("List the repo files.")).unwrap();
//!
//! let path = log.active_messages().unwrap();
//! let prompt = to_provider_messages(&path).unwrap();
//! assert_eq!(prompt.len(), 2);
//! ```

pub mod compress;
mod convert;
mod log;
pub mod tokens;
mod types;

pub use compress::{
    compress_if_needed, is_overflow, CompressionOutcome, PruneStats, Summarizer,
};
pub use convert::{part_from_prompt, part_to_prompt, to_provider_messages};
pub use log::{HistoryLog, HistorySink};
pub use types::{ContentPart, Message, MessageId, Role, TokenUsage};
