//! The standard five-node model↔tools agent loop (`spec.md` §4.7).

pub mod circuit_breaker;
pub mod model_node;
pub mod post_model;
pub mod pre_model;
pub mod retry;
pub mod tool_execute;
pub mod tools_node;

use std::sync::Arc;

use crate::channel::{ChannelSpec, Persistence, Scope, UpdatePolicy};
use crate::schema::{Schema, SchemaBuilder};

/// The conversation history, reduced with [`crate::channel::reducer::MessagesReducer`].
pub const CH_MESSAGES: &str = "messages";
/// The deferred `preModel` node's compacted working copy, read by `model`.
pub const CH_LLM_INPUT_MESSAGES: &str = "llmInputMessages";
/// Tool calls the `model` node proposed, awaiting approval/execution.
pub const CH_PENDING_TOOL_CALLS: &str = "pendingToolCalls";
/// Set once the model produces a turn with no tool calls.
pub const CH_FINAL_ANSWER: &str = "finalAnswer";
/// Accumulated prompt token count, `sum`-reduced.
pub const CH_TOKEN_COUNT: &str = "tokenCount";
/// The tool circuit breaker's checkpointed state.
pub const CH_CIRCUIT_BREAKER_STATE: &str = "circuitBreakerState";

/// Builds the schema the standard agent loop's five nodes share.
pub fn standard_schema() -> Schema {
    SchemaBuilder::default()
        .channel(ChannelSpec::messages(CH_MESSAGES, Persistence::Checkpointed))
        .channel(ChannelSpec::last_write_wins(
            CH_LLM_INPUT_MESSAGES,
            Scope::Global,
            UpdatePolicy::Single,
            Persistence::Ephemeral,
            "messages",
            Vec::<crate::messages::Message>::new,
        ))
        .channel(ChannelSpec::last_write_wins(
            CH_PENDING_TOOL_CALLS,
            Scope::Global,
            UpdatePolicy::Single,
            Persistence::Ephemeral,
            "toolCalls",
            Vec::<crate::messages::ToolCall>::new,
        ))
        .channel(ChannelSpec::last_write_wins(
            CH_FINAL_ANSWER,
            Scope::Global,
            UpdatePolicy::Single,
            Persistence::Ephemeral,
            "string",
            || Option::<String>::None,
        ))
        .channel(ChannelSpec::sum(CH_TOKEN_COUNT, Scope::Global, Persistence::Checkpointed, 0.0))
        .channel(ChannelSpec::last_write_wins(
            CH_CIRCUIT_BREAKER_STATE,
            Scope::Global,
            UpdatePolicy::Single,
            Persistence::Checkpointed,
            "circuitBreakerState",
            circuit_breaker::CircuitBreakerState::default,
        ))
        .build()
}

/// A compaction policy for the `preModel` node: keep the trailing
/// `preserve_last_messages` regardless of budget, then greedily add
/// older messages while the running count stays within `max_tokens`,
/// finally re-prepending a leading system message if it still fits.
#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    pub max_tokens: u64,
    pub preserve_last_messages: usize,
}

/// Shared wiring the standard agent's nodes need: a tokenizer (for
/// compaction) and a tool registry (for approval policy/execution) are
/// threaded in by whichever node needs them.
pub type SharedTokenizer = Arc<dyn crate::tokenizer::Tokenizer>;
pub type SharedToolRegistry = Arc<dyn crate::tool::ToolRegistry>;
pub type SharedModelClient = Arc<dyn crate::model::ModelClient>;
pub type SharedClock = Arc<dyn crate::clock::Clock>;
