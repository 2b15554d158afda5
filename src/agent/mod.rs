//! Agent module - the turn-based execution loop and its callbacks
//!
//! This module drives the conversation: build a prompt from history, stream
//! a completion, gate each tool call through approval, execute approved
//! ones, commit results, and repeat until the model stops calling tools, an
//! unrecoverable error occurs, or a limit or cancellation fires.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ HistoryLog  │────>│  AgentLoop  │────>│ ModelProvider│
//! │ (+compress) │     │             │     │  (stream)    │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                        │       │
//!                        │       │
//!                        ▼       ▼
//!                ┌──────────┐ ┌──────────────┐
//!                │ Approval │ │ ToolRegistry │
//!                │ Handler  │ │  (invoke)    │
//!                └──────────┘ └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clawcore::agent::{AgentLoop, CancelToken};
//! use clawcore::tools::{EchoTool, ToolRegistry};
//!
//! async fn run(provider: Arc<dyn clawcore::providers::ModelProvider>) {
//!     let mut tools = ToolRegistry::new();
//!     tools.register(Box::new(EchoTool));
//!
//!     let agent = AgentLoop::new(provider, Arc::new(tools));
//!     let (log, result) = agent.run_prompt("hello", CancelToken::new()).await;
//!     match result {
//!         Ok(outcome) => println!("{}", outcome.text),
//!         Err(failure) => eprintln!("run failed: {}", failure),
//!     }
//! }
//! ```

pub mod approval;
mod cancel;
mod r#loop;
mod prompt;

pub use approval::{ApprovalDecision, ApprovalHandler, ApproveAll, ToolTransform};
pub use cancel::CancelToken;
pub use prompt::{expand_file_references, PromptBuilder};
pub use r#loop::{
    AgentLoop, FailureKind, LoopFailure, LoopHooks, LoopOutcome, LoopResult, SKIPPED_RESULT,
};
