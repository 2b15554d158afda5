//! Providers module - the streaming LLM provider contract
//!
//! This module defines the `ModelProvider` trait and the provider-neutral
//! request/event types the agent loop speaks. Concrete clients (HTTP,
//! local inference, test doubles) implement `ModelProvider` and translate
//! between this format and their wire protocol.
//!
//! # Example
//!
//! ```rust,ignore
//! use clawcore::providers::{CompletionRequest, ModelProvider, StreamEvent};
//! use futures::StreamExt;
//!
//! async fn example(provider: &dyn ModelProvider) {
//!     let request = CompletionRequest::new("claw-3-sonnet", "Be helpful.", vec![]);
//!     let mut stream = provider.stream(request).await.unwrap();
//!     while let Some(event) = stream.next().await {
//!         if let StreamEvent::TextDelta(text) = event {
//!             print!("{}", text);
//!         }
//!     }
//! }
//! ```

pub mod backoff;
mod types;

pub use backoff::compute_backoff_ms;
pub use types::{
    CompletionRequest, EventStream, ModelProvider, PromptMessage, PromptPart, ResponseFormat,
    StopReason, StreamEvent, ThinkingConfig, ToolCallRequest, ToolChoice, ToolDefinition,
};
