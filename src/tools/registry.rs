//! Tool registry for ClawCore
//!
//! This module provides the `ToolRegistry` struct for managing and invoking
//! tools. Tools can be registered, looked up by name, and invoked with
//! proper logging and error handling.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::error::Result;
use crate::providers::ToolDefinition;

use super::{Tool, ToolResult};

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use clawcore::tools::{ToolRegistry, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// assert!(registry.has("echo"));
///
/// let result = registry.invoke("echo", json!({"message": "hello"}), "call_1").await;
/// assert_eq!(result.unwrap().content, "hello");
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool in the registry.
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Invoke a tool by name.
    ///
    /// # Arguments
    /// * `name` - The name of the tool to invoke
    /// * `args` - The JSON arguments for the tool
    /// * `call_id` - The call-correlation id from the model
    ///
    /// # Returns
    /// The tool's result. Tool-not-found returns `Ok(ToolResult::error(...))`
    /// so the model can react instead of the loop dying.
    pub async fn invoke(&self, name: &str, args: Value, call_id: &str) -> Result<ToolResult> {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                return Ok(ToolResult::error(format!("Tool not found: {}", name)));
            }
        };

        let start = Instant::now();

        match tool.execute(args, call_id).await {
            Ok(result) => {
                info!(
                    tool = name,
                    call_id = call_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    is_error = result.is_error,
                    "Tool invoked"
                );
                Ok(result)
            }
            Err(e) => {
                error!(
                    tool = name,
                    call_id = call_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool invocation failed"
                );
                Err(e)
            }
        }
    }

    /// Get all tool definitions for use with a model provider.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Get the names of all registered tools.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a tool exists in the registry.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;
    use serde_json::json;

    #[test]
    fn test_registry_new() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_register() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_registry_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let tool = registry.get("echo");
        assert!(tool.is_some());
        assert_eq!(tool.unwrap().name(), "echo");

        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_registry_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .invoke("echo", json!({"message": "hello"}), "call_1")
            .await
            .unwrap();
        assert_eq!(result.content, "hello");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_invoke_tool_not_found() {
        let registry = ToolRegistry::new();
        let result = registry.invoke("nonexistent", json!({}), "call_1").await;

        // Tool-not-found returns Ok(ToolResult::error(...))
        let output = result.unwrap();
        assert!(output.is_error);
        assert!(output.content.contains("Tool not found: nonexistent"));
    }

    #[tokio::test]
    async fn test_invoke_missing_message_arg() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry.invoke("echo", json!({}), "call_1").await.unwrap();
        assert_eq!(result.content, "(no message)");
    }

    #[test]
    fn test_registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "echo");
        assert_eq!(
            definitions[0].description,
            "Echoes back the provided message"
        );
        assert!(definitions[0].parameters.is_object());
    }

    #[test]
    fn test_registry_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let names = registry.names();
        assert_eq!(names.len(), 1);
        assert!(names.contains(&"echo"));
    }

    #[test]
    fn test_registry_replace_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EchoTool));

        assert_eq!(registry.len(), 1);
        assert!(registry.has("echo"));
    }
}
