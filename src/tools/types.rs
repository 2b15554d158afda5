//! Tool types for ClawCore
//!
//! This module defines the abstract tool contract the agent loop relies on:
//! the `Tool` trait, the `ToolResult` payload, and the category taxonomy
//! forwarded to approval callbacks. Concrete file-system and shell tools
//! live outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Category for approval enforcement.
///
/// Each tool is assigned a category describing its blast radius. The
/// approval callback receives it alongside the tool use so front ends can
/// apply per-category policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Read-only filesystem operations (read, list, glob).
    FilesystemRead,
    /// Write/modify filesystem operations (write, edit, delete).
    FilesystemWrite,
    /// Read-only network operations (fetch, search).
    NetworkRead,
    /// Network operations that modify external state.
    NetworkWrite,
    /// Shell command execution and process spawning.
    Shell,
    /// Session/workspace memory operations.
    Memory,
    /// Destructive or high-risk operations.
    Destructive,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilesystemRead => write!(f, "filesystem_read"),
            Self::FilesystemWrite => write!(f, "filesystem_write"),
            Self::NetworkRead => write!(f, "network_read"),
            Self::NetworkWrite => write!(f, "network_write"),
            Self::Shell => write!(f, "shell"),
            Self::Memory => write!(f, "memory"),
            Self::Destructive => write!(f, "destructive"),
        }
    }
}

/// The result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// Content fed back to the model as the tool result
    pub content: String,
    /// Whether this result represents an error condition
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result. The model sees the message and can react to it.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement.
///
/// Tools are executable functions the model can call to perform actions.
/// The loop invokes them through the registry, in emission order, after the
/// approval gate.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use clawcore::tools::{Tool, ToolResult};
/// use clawcore::error::Result;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl Tool for MyTool {
///     fn name(&self) -> &str { "my_tool" }
///     fn description(&self) -> &str { "Does something useful" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": {},
///             "required": []
///         })
///     }
///     async fn execute(&self, _args: Value, _call_id: &str) -> Result<ToolResult> {
///         Ok(ToolResult::text("Done!"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name. Must be unique within a registry.
    fn name(&self) -> &str;

    /// Get the tool description sent to the model.
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// # Arguments
    /// * `args` - The JSON arguments from the model
    /// * `call_id` - The call-correlation id of this invocation
    async fn execute(&self, args: Value, call_id: &str) -> Result<ToolResult>;

    /// Tool category for approval enforcement.
    ///
    /// Defaults to `ToolCategory::Shell` (fail-closed). A tool that forgets
    /// to override this lands in the most-scrutinized category rather than
    /// an over-permissive one.
    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }
}
