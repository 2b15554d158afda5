//! Tools module - the abstract tool contract for model function calling
//!
//! This module provides the infrastructure the agent loop relies on to
//! invoke tools on the model's behalf. Concrete file-system, shell, and
//! network tools are front-end concerns; the loop only depends on the
//! contract defined here.
//!
//! # Overview
//!
//! - `Tool` trait: The interface all tools implement
//! - `ToolResult`: The payload a tool hands back to the model
//! - `ToolCategory`: Blast-radius classification forwarded to approval
//! - `ToolRegistry`: Central registry for managing and invoking tools
//! - `EchoTool`: Simple echo tool for testing
//!
//! # Example
//!
//! ```rust
//! use clawcore::tools::{Tool, ToolRegistry, EchoTool};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(EchoTool));
//!
//! let result = registry.invoke("echo", json!({"message": "Hello!"}), "call_1").await;
//! assert_eq!(result.unwrap().content, "Hello!");
//!
//! // Get tool definitions for the model
//! let definitions = registry.definitions();
//! assert_eq!(definitions.len(), 1);
//! # });
//! ```

mod registry;
mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolCategory, ToolResult};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A simple tool that echoes back the provided message.
///
/// Useful for testing the agent loop and approval flow end to end without
/// touching the filesystem or network.
///
/// # Example
/// ```
/// use clawcore::tools::{Tool, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = EchoTool;
/// let result = tool.execute(json!({"message": "hi"}), "call_1").await.unwrap();
/// assert_eq!(result.content, "hi");
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _call_id: &str) -> Result<ToolResult> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(ToolResult::text(message))
    }
}
