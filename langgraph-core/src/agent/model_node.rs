//! The `model` node: invokes the abstract streaming model client and
//! writes its turn to the store (`spec.md` §4.7, §4.7.1).

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::retry::RetryPolicy;
use crate::agent::{SharedClock, SharedModelClient, CH_FINAL_ANSWER, CH_LLM_INPUT_MESSAGES, CH_MESSAGES, CH_PENDING_TOOL_CALLS};
use crate::error::Result;
use crate::event::EventKind;
use crate::ids::{assistant_message_id, task_id};
use crate::messages::{Message, Role};
use crate::model::{validate_stream, ModelRequest};
use crate::node::{Node, NodeInput, NodeOutput, NextDirective};
use crate::store::WriteBatch;

/// The `model` node.
pub struct ModelNode {
    pub client: SharedModelClient,
    pub retry: RetryPolicy,
    pub clock: SharedClock,
}

#[async_trait]
impl Node for ModelNode {
    async fn invoke(&self, input: NodeInput) -> Result<NodeOutput> {
        let compacted: Vec<Message> = input.store.get_typed(CH_LLM_INPUT_MESSAGES).await?;
        let effective_messages = if compacted.is_empty() {
            input.store.get_typed::<Vec<Message>>(CH_MESSAGES).await?
        } else {
            compacted
        };

        input.events.emit(EventKind::ModelInvocationStarted).await;

        let client = self.client.clone();
        let messages_for_attempt = effective_messages.clone();
        let result = self
            .retry
            .run(self.clock.as_ref(), move |_attempt| {
                let client = client.clone();
                let request = ModelRequest {
                    messages: messages_for_attempt.clone(),
                };
                async move {
                    let stream = client.stream(request).await?;
                    validate_stream(stream).await
                }
            })
            .await;

        input.events.emit(EventKind::ModelInvocationFinished).await;

        let (_tokens, response) = result?;

        let task_id = task_id(&input.run_id, input.step_index, &input.node_id, input.task_ordinal);
        let message_id = assistant_message_id(&task_id, "assistant");

        let mut writes = WriteBatch::new();
        let assistant_message = Message::new(message_id, Role::Assistant, response.content.clone())
            .with_tool_calls(response.tool_calls.clone());
        writes.push(CH_MESSAGES, serde_json::to_value(assistant_message)?);
        writes.push(CH_PENDING_TOOL_CALLS, serde_json::to_value(&response.tool_calls)?);

        if response.tool_calls.is_empty() {
            writes.push(CH_FINAL_ANSWER, Value::from(response.content));
        }

        Ok(NodeOutput::commit(writes, NextDirective::UseGraphEdges))
    }
}
