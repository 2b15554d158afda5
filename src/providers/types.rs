//! Provider types for ClawCore
//!
//! This module defines the core types and traits for LLM providers: the
//! `ModelProvider` trait, the provider-neutral prompt format, and the
//! discriminated event stream a completion produces. Concrete HTTP clients
//! live outside this crate and implement `ModelProvider`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::CancelToken;
use crate::error::{ProviderError, Result};
use crate::history::{Role, TokenUsage};

/// Definition of a tool that can be called by the model.
///
/// Tool definitions describe the available tools, their parameters,
/// and how the model should invoke them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use clawcore::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "read_file",
    ///     "Read a file from the workspace",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "path": { "type": "string", "description": "File path" }
    ///         },
    ///         "required": ["path"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "read_file");
    /// ```
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// How the model is allowed to use tools for a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call tools
    #[default]
    Auto,
    /// Tools are disabled for this completion
    None,
    /// The model must call at least one tool
    Required,
}

/// Structured-output format requested from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text (the default when unset)
    Text,
    /// JSON object output
    Json,
}

/// Extended-thinking configuration forwarded to providers that support it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Whether thinking is enabled
    pub enabled: bool,
    /// Optional token budget for the thinking phase
    pub budget_tokens: Option<u32>,
}

/// A message in provider-neutral prompt format.
///
/// Produced by the lossless conversion from history messages; consumed by
/// concrete provider clients which translate it to their wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// The role of the message
    pub role: Role,
    /// Ordered content parts
    pub content: Vec<PromptPart>,
}

/// One content part of a [`PromptMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptPart {
    /// Plain text
    Text {
        /// The text content
        text: String,
    },
    /// Model reasoning from an earlier turn
    Reasoning {
        /// The reasoning content
        text: String,
    },
    /// Inline image data
    Image {
        /// MIME type
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    /// Inline file content
    File {
        /// Original path
        path: String,
        /// The file content
        data: String,
    },
    /// A tool invocation from an earlier assistant turn
    ToolUse {
        /// Call-correlation id
        id: String,
        /// Tool name
        name: String,
        /// JSON input
        input: Value,
    },
    /// A tool result from an earlier tool batch
    ToolResult {
        /// Id of the tool-use part this answers
        tool_use_id: String,
        /// Tool name
        tool_name: String,
        /// The input the tool ran with
        input: Value,
        /// Result payload
        content: String,
        /// Whether the result is an error
        is_error: bool,
    },
}

/// A complete tool call emitted by the model during a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// JSON input for the tool
    pub input: Value,
}

impl ToolCallRequest {
    /// Create a new tool call request.
    pub fn new(id: &str, name: &str, input: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the assistant turn
    EndTurn,
    /// The model wants its tool calls executed
    ToolUse,
    /// Generation hit the max-token limit
    MaxTokens,
}

/// One event of a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of assistant text
    TextDelta(String),
    /// A fragment of model reasoning
    ReasoningDelta(String),
    /// A complete tool call (providers assemble fragments before emitting)
    ToolCall(ToolCallRequest),
    /// The completion finished
    Finish {
        /// Token usage for this completion
        usage: TokenUsage,
        /// Why generation stopped
        stop_reason: StopReason,
    },
    /// The stream failed
    Error(ProviderError),
}

/// A pinned, boxed stream of completion events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A streaming completion request.
#[derive(Clone)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// System prompt
    pub system: String,
    /// Conversation in provider-neutral format
    pub messages: Vec<PromptMessage>,
    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
    /// Tool-use policy
    pub tool_choice: ToolChoice,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Optional structured-output format
    pub response_format: Option<ResponseFormat>,
    /// Optional extended-thinking configuration
    pub thinking: Option<ThinkingConfig>,
    /// Cancellation token the provider should observe between chunks
    pub cancel: CancelToken,
}

impl CompletionRequest {
    /// Create a request with the required fields and defaults elsewhere.
    pub fn new(model: &str, system: &str, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.to_string(),
            system: system.to_string(),
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: 8192,
            response_format: None,
            thinking: None,
            cancel: CancelToken::new(),
        }
    }

    /// Set the available tools.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the tool-use policy.
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    /// Set the generation token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Trait for streaming LLM providers.
///
/// Implement this trait to connect a concrete provider client. The provider
/// translates the neutral [`CompletionRequest`] into its wire format and
/// yields a discriminated [`StreamEvent`] stream.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name (e.g. "anthropic", "openai").
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Context window of the given model in tokens. Return 0 when the limit
    /// is unknown; overflow detection is disabled for a zero window.
    fn context_window(&self, model: &str) -> u32;

    /// Open a streaming completion.
    ///
    /// # Errors
    /// Returns a [`ProviderError`](crate::error::ProviderError)-classified
    /// failure when the stream cannot be opened; stream-level failures
    /// arrive as [`StreamEvent::Error`].
    async fn stream(&self, request: CompletionRequest) -> Result<EventStream>;
}
