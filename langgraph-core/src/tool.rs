//! The tool registry external collaborator (`spec.md` §6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, RuntimeError};
use crate::messages::ToolCall;

/// A tool's advertised shape.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// The result of invoking one tool call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}

/// `listTools() -> [ToolDefinition]` and `invoke(call) -> ToolResult`.
/// Tool names must be unique and must sort (UTF-8) the same way on
/// every call, so that prompts built from `listTools` are deterministic.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDefinition>;
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult>;
}

/// A simple in-memory registry over a fixed set of async closures,
/// sufficient for tests and for compositions that don't need a live
/// MCP/HTTP-backed registry.
pub struct StaticToolRegistry {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, Arc<dyn Fn(&ToolCall) -> Result<ToolResult> + Send + Sync>>,
}

impl StaticToolRegistry {
    pub fn builder() -> StaticToolRegistryBuilder {
        StaticToolRegistryBuilder::default()
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut defs = self.definitions.clone();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult> {
        let handler = self.handlers.get(&call.name).ok_or_else(|| RuntimeError::ToolFailed {
            tool: call.name.clone(),
            cause: "no such tool".to_string(),
        })?;
        handler(call)
    }
}

/// Builds a [`StaticToolRegistry`], failing at construction time on a
/// duplicate tool name.
#[derive(Default)]
pub struct StaticToolRegistryBuilder {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, Arc<dyn Fn(&ToolCall) -> Result<ToolResult> + Send + Sync>>,
}

impl StaticToolRegistryBuilder {
    pub fn tool<F>(mut self, definition: ToolDefinition, handler: F) -> Result<Self>
    where
        F: Fn(&ToolCall) -> Result<ToolResult> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(&definition.name) {
            return Err(RuntimeError::DuplicateToolName(definition.name));
        }
        self.handlers.insert(definition.name.clone(), Arc::new(handler));
        self.definitions.push(definition);
        Ok(self)
    }

    pub fn build(self) -> StaticToolRegistry {
        StaticToolRegistry {
            definitions: self.definitions,
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: String::new(),
            parameters_schema: json!({}),
        }
    }

    #[test]
    fn duplicate_tool_name_fails_construction() {
        let err = StaticToolRegistry::builder()
            .tool(def("calc"), |_| {
                Ok(ToolResult {
                    call_id: "x".to_string(),
                    content: String::new(),
                })
            })
            .unwrap()
            .tool(def("calc"), |_| {
                Ok(ToolResult {
                    call_id: "x".to_string(),
                    content: String::new(),
                })
            });
        assert!(matches!(err, Err(RuntimeError::DuplicateToolName(_))));
    }

    #[test]
    fn list_tools_is_sorted_by_name() {
        let registry = StaticToolRegistry::builder()
            .tool(def("zeta"), |_| {
                Ok(ToolResult {
                    call_id: "1".to_string(),
                    content: String::new(),
                })
            })
            .unwrap()
            .tool(def("alpha"), |_| {
                Ok(ToolResult {
                    call_id: "2".to_string(),
                    content: String::new(),
                })
            })
            .unwrap()
            .build();
        let names: Vec<String> = registry.list_tools().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[tokio::test]
    async fn invoke_dispatches_to_matching_handler() {
        let registry = StaticToolRegistry::builder()
            .tool(def("calc"), |call| {
                Ok(ToolResult {
                    call_id: call.id.clone(),
                    content: "4".to_string(),
                })
            })
            .unwrap()
            .build();
        let call = ToolCall {
            id: "c1".to_string(),
            name: "calc".to_string(),
            arguments: json!({}),
        };
        let result = registry.invoke(&call).await.unwrap();
        assert_eq!(result.content, "4");
    }
}
