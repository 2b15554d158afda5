//! History types for ClawCore
//!
//! This module defines the core types for conversation history: messages,
//! roles, content parts, and token usage. Messages form a parent-linked tree
//! so that conversations can fork; the path from any message back to the
//! root is the slice a provider actually sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier of a message within a history log.
pub type MessageId = String;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
    /// Results from tool executions
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One piece of message content.
///
/// A message body is an ordered list of parts. Text and reasoning carry the
/// model-facing transcript; tool-use and tool-result parts carry the
/// function-calling protocol; image and file parts carry multimodal input.
/// `Opaque` preserves parts written by newer versions of the log format —
/// they survive serialization but the provider conversion refuses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// The text content
        text: String,
    },
    /// Model reasoning/thinking output
    Reasoning {
        /// The reasoning content
        text: String,
    },
    /// Inline image data
    Image {
        /// MIME type (e.g. "image/png")
        media_type: String,
        /// Base64-encoded image bytes
        data: String,
    },
    /// Inline file content
    File {
        /// Original path of the file
        path: String,
        /// The file content
        data: String,
    },
    /// A tool invocation requested by the assistant
    ToolUse {
        /// Call-correlation id
        id: String,
        /// Name of the tool
        name: String,
        /// JSON input for the tool
        input: Value,
    },
    /// The result of a tool invocation, attached to a tool-role message.
    ///
    /// Created once by the agent loop. `content` and `pruned` are the only
    /// fields ever mutated afterwards, and only by the compression engine.
    ToolResult {
        /// Id of the tool-use part this result answers
        tool_use_id: String,
        /// Name of the tool that produced it
        tool_name: String,
        /// The input the tool was invoked with
        input: Value,
        /// The result payload
        content: String,
        /// Whether the result represents an error
        is_error: bool,
        /// When the result content was pruned, if it was
        #[serde(skip_serializing_if = "Option::is_none")]
        pruned: Option<DateTime<Utc>>,
    },
    /// A part written by a newer log format. Carried through serialization
    /// untouched; provider conversion raises on it.
    Opaque {
        /// Original part type tag
        kind: String,
        /// Original payload
        data: Value,
    },
}

impl ContentPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Create a reasoning part.
    pub fn reasoning(text: impl Into<String>) -> Self {
        ContentPart::Reasoning { text: text.into() }
    }

    /// Create a tool-use part.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentPart::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a successful tool-result part.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
        content: impl Into<String>,
    ) -> Self {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            input,
            content: content.into(),
            is_error: false,
            pruned: None,
        }
    }

    /// Create an error tool-result part.
    pub fn tool_error(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
        content: impl Into<String>,
    ) -> Self {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            input,
            content: content.into(),
            is_error: true,
            pruned: None,
        }
    }
}

/// Token usage reported by the provider for one completion, and accumulated
/// into running session totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used (prompt + completion)
    pub total_tokens: u32,
    /// Prompt tokens served from the provider's cache
    pub cache_read_tokens: u32,
}

impl TokenUsage {
    /// Create new usage information.
    ///
    /// # Example
    /// ```
    /// use clawcore::history::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50, 20);
    /// assert_eq!(usage.total_tokens, 150);
    /// assert_eq!(usage.cache_read_tokens, 20);
    /// ```
    pub fn new(prompt_tokens: u32, completion_tokens: u32, cache_read_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cache_read_tokens,
        }
    }

    /// Accumulate another usage record into this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    /// Tokens counted against the context window: prompt plus cache reads.
    pub fn used_tokens(&self) -> u32 {
        self.prompt_tokens + self.cache_read_tokens
    }
}

/// A single message: one node in the parent-linked conversation tree.
///
/// The tree invariant: exactly one root per log (parent `None`); every other
/// parent id resolves within the same log. Forking a conversation means
/// adding a child to an older message; unreachable branches stay in the log
/// but are never sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier of this message
    pub id: MessageId,
    /// Parent message id; `None` only for the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<MessageId>,
    /// The role of the message sender
    pub role: Role,
    /// Ordered content parts
    pub content: Vec<ContentPart>,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Model that produced this message (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Per-turn token usage (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent: None,
            role,
            content,
            timestamp: Utc::now(),
            model: None,
            usage: None,
        }
    }

    /// Create a new user message with plain text content.
    ///
    /// # Example
    /// ```
    /// use clawcore::history::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// assert_eq!(msg.text(), "Hello, assistant!");
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::text(content)])
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::text(content)])
    }

    /// Create a new assistant message from content parts.
    ///
    /// # Example
    /// ```
    /// use clawcore::history::{ContentPart, Message, Role};
    ///
    /// let msg = Message::assistant(vec![ContentPart::text("Hello!")]);
    /// assert_eq!(msg.role, Role::Assistant);
    /// ```
    pub fn assistant(content: Vec<ContentPart>) -> Self {
        Self::with_parts(Role::Assistant, content)
    }

    /// Create a tool-role message holding one batch of tool results.
    pub fn tool_results(results: Vec<ContentPart>) -> Self {
        Self::with_parts(Role::Tool, results)
    }

    /// Tag this message with the model that produced it.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Attach per-turn token usage.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Concatenated text of all `Text` parts.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// All tool-use parts in emission order.
    pub fn tool_uses(&self) -> Vec<&ContentPart> {
        self.content
            .iter()
            .filter(|p| matches!(p, ContentPart::ToolUse { .. }))
            .collect()
    }

    /// Check if this message contains any tool-use parts.
    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::ToolUse { .. }))
    }
}
