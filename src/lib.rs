//! ClawCore - reasoning and orchestration core for a CLI coding agent
//!
//! Three components, bottom-up:
//!
//! 1. [`bus`] — duplex request/response plus publish/subscribe over a
//!    pluggable transport, connecting the core to its front ends.
//! 2. [`history`] — the conversation log as a parent-linked message tree,
//!    with provider-format conversion and token-budget compression.
//! 3. [`agent`] — the turn-based execution loop: stream a completion,
//!    gate tool calls through approval, execute, commit, repeat.
//!
//! Front ends, concrete provider clients, and concrete tools plug in via
//! the [`providers::ModelProvider`], [`tools::Tool`], and
//! [`agent::ApprovalHandler`] traits.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod history;
pub mod providers;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, CancelToken, FailureKind, LoopFailure, LoopOutcome, LoopResult};
pub use bus::{Envelope, MessageBus, PipeTransport, Transport};
pub use config::Config;
pub use error::{CoreError, ProviderError, Result};
pub use history::{ContentPart, HistoryLog, HistorySink, Message, Role, TokenUsage};
pub use providers::{
    CompletionRequest, ModelProvider, StreamEvent, ToolCallRequest, ToolDefinition,
};
pub use tools::{Tool, ToolRegistry, ToolResult};
