//! The `toolExecute` node: registry dispatch, per-tool retry, and the
//! per-thread circuit breaker (`spec.md` §4.7).

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;

use crate::agent::circuit_breaker::{CircuitBreakerPolicy, CircuitBreakerState};
use crate::agent::retry::RetryPolicy;
use crate::agent::{SharedClock, SharedToolRegistry, CH_CIRCUIT_BREAKER_STATE, CH_MESSAGES, CH_PENDING_TOOL_CALLS};
use crate::error::Result;
use crate::event::EventKind;
use crate::ids::{assistant_message_id, tool_message_id};
use crate::messages::{Message, Role, ToolCall};
use crate::node::{Node, NodeInput, NodeOutput, NextDirective};
use crate::store::WriteBatch;
use crate::tool::ToolResult;

/// The `toolExecute` node.
pub struct ToolExecuteNode {
    pub registry: SharedToolRegistry,
    /// Per-tool-name retry overrides; tools absent here use `default_retry`.
    pub retry_policies: HashMap<String, RetryPolicy>,
    pub default_retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerPolicy,
    pub clock: SharedClock,
}

impl ToolExecuteNode {
    fn retry_for(&self, name: &str) -> RetryPolicy {
        self.retry_policies.get(name).copied().unwrap_or(self.default_retry)
    }

    async fn invoke_one(&self, call: ToolCall) -> (ToolCall, std::result::Result<ToolResult, String>) {
        let policy = self.retry_for(&call.name);
        let registry = self.registry.clone();
        let call_for_run = call.clone();
        let result = policy
            .run(self.clock.as_ref(), move |_attempt| {
                let registry = registry.clone();
                let call = call_for_run.clone();
                async move { registry.invoke(&call).await }
            })
            .await;
        (call, result.map_err(|e| e.to_string()))
    }
}

#[async_trait]
impl Node for ToolExecuteNode {
    async fn invoke(&self, input: NodeInput) -> Result<NodeOutput> {
        let mut calls: Vec<ToolCall> = input.store.get_typed(CH_PENDING_TOOL_CALLS).await?;
        calls.sort_by(|a, b| (a.name.as_str(), a.id.as_str()).cmp(&(b.name.as_str(), b.id.as_str())));

        let mut breaker: CircuitBreakerState = input.store.get_typed(CH_CIRCUIT_BREAKER_STATE).await?;
        let mut writes = WriteBatch::new();

        if breaker.check(&self.circuit_breaker, input.step_index) {
            tracing::warn!(
                thread_id = %input.thread_id,
                step = input.step_index,
                failure_streak = breaker.failure_streak,
                "tool circuit breaker open; skipping tool execution"
            );
            let system_message = Message::new(
                assistant_message_id(&input.task_id, "system"),
                Role::System,
                "tool circuit breaker open; skipping tool execution",
            );
            writes.push(CH_MESSAGES, serde_json::to_value(system_message)?);
            writes.push(CH_PENDING_TOOL_CALLS, serde_json::to_value(Vec::<ToolCall>::new())?);
            writes.push(CH_CIRCUIT_BREAKER_STATE, serde_json::to_value(breaker)?);
            return Ok(NodeOutput::commit(writes, NextDirective::End));
        }

        for call in &calls {
            input
                .events
                .emit(EventKind::ToolInvocationStarted {
                    name: call.name.clone(),
                    tool_call_id: call.id.clone(),
                })
                .await;
        }

        let outcomes = join_all(calls.iter().cloned().map(|call| self.invoke_one(call))).await;

        let mut by_id: HashMap<String, std::result::Result<ToolResult, String>> =
            outcomes.into_iter().map(|(call, result)| (call.id, result)).collect();

        for call in &calls {
            let result = by_id.remove(&call.id).expect("every call has an outcome");
            let success = result.is_ok();
            input
                .events
                .emit(EventKind::ToolInvocationFinished {
                    name: call.name.clone(),
                    success,
                    tool_call_id: call.id.clone(),
                })
                .await;

            if success {
                breaker.record_success();
            } else {
                breaker.record_failure(&self.circuit_breaker, input.step_index);
                tracing::warn!(
                    thread_id = %input.thread_id,
                    tool = %call.name,
                    tool_call_id = %call.id,
                    failure_streak = breaker.failure_streak,
                    "tool invocation failed"
                );
            }

            let content = match result {
                Ok(tool_result) => tool_result.content,
                Err(cause) => format!("tool {} failed: {cause}", call.name),
            };
            let message = Message::new(tool_message_id(&call.id, false), Role::Tool, content)
                .with_tool_call_id(call.id.clone());
            writes.push(CH_MESSAGES, serde_json::to_value(message)?);
        }

        writes.push(CH_PENDING_TOOL_CALLS, serde_json::to_value(Vec::<ToolCall>::new())?);
        writes.push(CH_CIRCUIT_BREAKER_STATE, serde_json::to_value(breaker)?);

        Ok(NodeOutput::commit(writes, NextDirective::UseGraphEdges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::tool::{StaticToolRegistry, ToolDefinition};
    use serde_json::json;
    use std::sync::Arc;

    fn node(registry: SharedToolRegistry) -> ToolExecuteNode {
        ToolExecuteNode {
            registry,
            retry_policies: HashMap::new(),
            default_retry: RetryPolicy::passthrough(),
            circuit_breaker: CircuitBreakerPolicy {
                failure_threshold: 2,
                cooldown_steps: 5,
            },
            clock: Arc::new(SimulatedClock::new()),
        }
    }

    #[tokio::test]
    async fn failing_call_is_rendered_as_content_not_propagated() {
        let registry: SharedToolRegistry = Arc::new(
            StaticToolRegistry::builder()
                .tool(
                    ToolDefinition {
                        name: "boom".to_string(),
                        description: String::new(),
                        parameters_schema: json!({}),
                    },
                    |_| {
                        Err(crate::error::RuntimeError::ToolFailed {
                            tool: "boom".to_string(),
                            cause: "nope".to_string(),
                        })
                    },
                )
                .unwrap()
                .build(),
        );
        let call = ToolCall {
            id: "c1".to_string(),
            name: "boom".to_string(),
            arguments: json!({}),
        };
        let executor = node(registry);
        let (call, result) = executor.invoke_one(call).await;
        assert_eq!(call.name, "boom");
        assert!(result.is_err());
    }
}
