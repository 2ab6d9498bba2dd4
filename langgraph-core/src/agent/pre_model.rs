//! The deferred `preModel` node: compaction and token-count bookkeeping
//! (`spec.md` §4.7).

use async_trait::async_trait;

use crate::agent::{CompactionPolicy, SharedTokenizer, CH_LLM_INPUT_MESSAGES, CH_MESSAGES, CH_PENDING_TOOL_CALLS, CH_TOKEN_COUNT};
use crate::error::Result;
use crate::messages::{Message, Role};
use crate::node::{Node, NodeInput, NodeOutput, NextDirective};
use crate::store::WriteBatch;
use crate::tokenizer::Tokenizer;

/// Greedily keeps the trailing `preserve_last_messages` regardless of
/// budget, extends older messages while the running token count stays
/// within `max_tokens`, then re-prepends a leading system message if
/// it still fits.
pub fn compact(messages: &[Message], tokenizer: &dyn Tokenizer, policy: &CompactionPolicy) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let leading_system = messages.first().filter(|m| m.role == Role::System).cloned();
    let mut kept: Vec<Message> = Vec::new();
    let mut used = 0u64;

    for (index, message) in messages.iter().enumerate().rev() {
        let trailing_position = messages.len() - 1 - index;
        let message_tokens = tokenizer.count_tokens(std::slice::from_ref(message));
        let must_keep = trailing_position < policy.preserve_last_messages;
        if must_keep || used + message_tokens <= policy.max_tokens {
            kept.push(message.clone());
            used += message_tokens;
        } else {
            break;
        }
    }
    kept.reverse();

    if let Some(system_message) = leading_system {
        let already_present = kept.first().map(|m| m.id == system_message.id).unwrap_or(false);
        if !already_present {
            let system_tokens = tokenizer.count_tokens(std::slice::from_ref(&system_message));
            if used + system_tokens <= policy.max_tokens {
                kept.insert(0, system_message);
            }
        }
    }

    kept
}

/// The `preModel` node.
pub struct PreModelNode {
    pub compaction: Option<CompactionPolicy>,
    pub tokenizer: Option<SharedTokenizer>,
}

#[async_trait]
impl Node for PreModelNode {
    async fn invoke(&self, input: NodeInput) -> Result<NodeOutput> {
        let messages: Vec<Message> = input.store.get_typed(CH_MESSAGES).await?;
        // Re-read purely to assert the channel exists even when this
        // node takes no action on it this step.
        let _: Vec<crate::messages::ToolCall> = input.store.get_typed(CH_PENDING_TOOL_CALLS).await?;

        let mut writes = WriteBatch::new();

        let recorded_tokens: f64 = input.store.get_typed(CH_TOKEN_COUNT).await?;
        if recorded_tokens == 0.0 && !messages.is_empty() {
            if let Some(tokenizer) = &self.tokenizer {
                let full_count = tokenizer.count_tokens(&messages);
                writes.push(CH_TOKEN_COUNT, serde_json::Value::from(full_count as f64));
            }
        }

        if let (Some(policy), Some(tokenizer)) = (&self.compaction, &self.tokenizer) {
            if recorded_tokens > policy.max_tokens as f64 {
                let compacted = compact(&messages, tokenizer.as_ref(), policy);
                writes.push(CH_LLM_INPUT_MESSAGES, serde_json::to_value(compacted)?);
            }
        }

        Ok(NodeOutput::commit(writes, NextDirective::UseGraphEdges))
    }
}
