//! Assembles the standard `preModel` → `model` → `tools` → `toolExecute`
//! → `postModel` loop from `langgraph_core::agent` node primitives. This
//! is the one topology this crate ships: the caller supplies a model
//! client and, optionally, a tool registry and the collaborators that
//! shape compaction, retries, and tool approval, and gets back a
//! compiled graph ready to hand to `langgraph_core::Runtime`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use langgraph_core::agent::circuit_breaker::CircuitBreakerPolicy;
use langgraph_core::agent::model_node::ModelNode;
use langgraph_core::agent::post_model::PostModelNode;
use langgraph_core::agent::pre_model::PreModelNode;
use langgraph_core::agent::retry::RetryPolicy;
use langgraph_core::agent::tool_execute::ToolExecuteNode;
use langgraph_core::agent::tools_node::{ApprovalPolicy, ToolsNode};
use langgraph_core::agent::{
    standard_schema, CompactionPolicy, SharedClock, SharedModelClient, SharedTokenizer, SharedToolRegistry,
    CH_PENDING_TOOL_CALLS,
};
use langgraph_core::clock::SystemClock;
use langgraph_core::messages::ToolCall;
use langgraph_core::schema::Schema;
use langgraph_core::store::Store;
use langgraph_core::tool::StaticToolRegistry;
use langgraph_core::{CompiledGraph, GraphBuilder, Result as CoreResult, Router, RouterDecision};

use crate::error::Result;

pub const NODE_PRE_MODEL: &str = "preModel";
pub const NODE_MODEL: &str = "model";
pub const NODE_TOOLS: &str = "tools";
pub const NODE_TOOL_EXECUTE: &str = "toolExecute";
pub const NODE_POST_MODEL: &str = "postModel";

/// Routes `model`'s frontier: on to `tools` whenever the turn proposed
/// calls, ending the run otherwise. `model` itself always reports
/// `NextDirective::UseGraphEdges`; this router is what actually decides
/// whether a turn needs a tools round.
struct ToolDispatchRouter;

#[async_trait]
impl Router for ToolDispatchRouter {
    async fn route(&self, store: &Store) -> CoreResult<RouterDecision> {
        let calls: Vec<ToolCall> = store.get_typed(CH_PENDING_TOOL_CALLS).await?;
        if calls.is_empty() {
            Ok(RouterDecision::End)
        } else {
            Ok(RouterDecision::Nodes(vec![NODE_TOOLS.to_string()]))
        }
    }
}

/// Collaborators and policies for [`build`]. Only `model_client` is
/// required; [`StandardAgentConfig::new`] defaults everything else to
/// the same no-op collaborators `langgraph_core::agent`'s own node
/// defaults assume (no compaction, no tools, never-approve, a real
/// clock, single-attempt retries).
pub struct StandardAgentConfig {
    pub model_client: SharedModelClient,
    pub model_retry: RetryPolicy,
    pub clock: SharedClock,
    pub tokenizer: Option<SharedTokenizer>,
    pub compaction: Option<CompactionPolicy>,
    pub tool_registry: Option<SharedToolRegistry>,
    pub approval_policy: ApprovalPolicy,
    pub tool_retry_policies: HashMap<String, RetryPolicy>,
    pub default_tool_retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerPolicy,
}

impl StandardAgentConfig {
    pub fn new(model_client: SharedModelClient) -> Self {
        Self {
            model_client,
            model_retry: RetryPolicy::passthrough(),
            clock: Arc::new(SystemClock),
            tokenizer: None,
            compaction: None,
            tool_registry: None,
            approval_policy: ApprovalPolicy::Never,
            tool_retry_policies: HashMap::new(),
            default_tool_retry: RetryPolicy::passthrough(),
            circuit_breaker: CircuitBreakerPolicy {
                failure_threshold: 3,
                cooldown_steps: 4,
            },
        }
    }
}

/// The compiled graph plus the schema its channels require, ready to
/// pass to `langgraph_core::Runtime::new`.
pub struct StandardAgent {
    pub graph: Arc<CompiledGraph>,
    pub schema: Arc<Schema>,
}

/// Assembles the standard five-node loop: `preModel` (deferred) →
/// `model` (with the tool-dispatch router attached) → `tools` →
/// `toolExecute` → `postModel` → back to `preModel`, starting at
/// `preModel`.
pub fn build(config: StandardAgentConfig) -> Result<StandardAgent> {
    let tool_registry = config
        .tool_registry
        .unwrap_or_else(|| Arc::new(StaticToolRegistry::builder().build()));

    let pre_model = Arc::new(PreModelNode {
        compaction: config.compaction,
        tokenizer: config.tokenizer,
    });
    let model = Arc::new(ModelNode {
        client: config.model_client,
        retry: config.model_retry,
        clock: config.clock.clone(),
    });
    let tools = Arc::new(ToolsNode {
        policy: config.approval_policy,
    });
    let tool_execute = Arc::new(ToolExecuteNode {
        registry: tool_registry,
        retry_policies: config.tool_retry_policies,
        default_retry: config.default_tool_retry,
        circuit_breaker: config.circuit_breaker,
        clock: config.clock,
    });
    let post_model = Arc::new(PostModelNode);

    let graph = GraphBuilder::default()
        .deferred_node(NODE_PRE_MODEL, pre_model)
        .node(NODE_MODEL, model)
        .node(NODE_TOOLS, tools)
        .node(NODE_TOOL_EXECUTE, tool_execute)
        .node(NODE_POST_MODEL, post_model)
        .edge(NODE_PRE_MODEL, NODE_MODEL)
        .edge(NODE_TOOLS, NODE_TOOL_EXECUTE)
        .edge(NODE_TOOL_EXECUTE, NODE_POST_MODEL)
        .edge(NODE_POST_MODEL, NODE_PRE_MODEL)
        .router(NODE_MODEL, Arc::new(ToolDispatchRouter))
        .start_at([NODE_PRE_MODEL])
        .build()?;

    tracing::info!(
        nodes = 5,
        start = NODE_PRE_MODEL,
        "standard agent graph assembled"
    );

    Ok(StandardAgent {
        graph: Arc::new(graph),
        schema: Arc::new(standard_schema()),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use langgraph_core::model::{ModelClient, ModelRequest, ModelResponse, StreamEvent};

    use super::*;

    struct EchoModel;

    #[async_trait]
    impl ModelClient for EchoModel {
        async fn stream(&self, _request: ModelRequest) -> CoreResult<BoxStream<'static, StreamEvent>> {
            Ok(Box::pin(futures::stream::iter(vec![StreamEvent::Final(ModelResponse {
                content: "hi".to_string(),
                tool_calls: vec![],
            })])))
        }
    }

    #[test]
    fn builds_a_graph_starting_at_pre_model() {
        let config = StandardAgentConfig::new(Arc::new(EchoModel));
        let agent = build(config).unwrap();
        assert_eq!(agent.graph.start_set(), &[NODE_PRE_MODEL.to_string()]);
        assert!(agent.graph.router_from(NODE_MODEL).is_some());
        assert_eq!(agent.graph.static_edges_from(NODE_POST_MODEL), &[NODE_PRE_MODEL.to_string()]);
    }
}
