//! The `postModel` node: a pass-through hook point for extensions that
//! want to observe or veto a turn after `model`/`toolExecute` without
//! the standard loop depending on it (`spec.md` §4.7).

use async_trait::async_trait;

use crate::error::Result;
use crate::node::{Node, NodeInput, NodeOutput, NextDirective};
use crate::store::WriteBatch;

/// The `postModel` node. Commits no writes of its own and always
/// follows the graph's static edges.
pub struct PostModelNode;

#[async_trait]
impl Node for PostModelNode {
    async fn invoke(&self, _input: NodeInput) -> Result<NodeOutput> {
        Ok(NodeOutput::commit(WriteBatch::new(), NextDirective::UseGraphEdges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelSpec, Persistence, Scope, UpdatePolicy};
    use crate::clock::SimulatedClock;
    use crate::event::EventBus;
    use crate::ids::task_id;
    use crate::schema::SchemaBuilder;
    use crate::store::Store;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn pass_through_commits_nothing() {
        let schema = SchemaBuilder::default()
            .channel(ChannelSpec::last_write_wins(
                "noop",
                Scope::Global,
                UpdatePolicy::Single,
                Persistence::Ephemeral,
                "string",
                || json!(null),
            ))
            .build();
        let store = Arc::new(Store::new(Arc::new(schema)));
        let (bus, _rx) = EventBus::new(4);
        let events = crate::event::EventEmitter::new(bus, Some(0), Some(0));
        let _clock = SimulatedClock::new();
        let input = NodeInput {
            store,
            run_id: "run-1".to_string(),
            thread_id: "thread-1".to_string(),
            step_index: 0,
            task_id: task_id("run-1", 0, "postModel", 0),
            task_ordinal: 0,
            node_id: "postModel".to_string(),
            resume: None,
            events,
            cancellation: CancellationToken::new(),
        };
        let output = PostModelNode.invoke(input).await.unwrap();
        assert!(output.writes.is_empty());
        assert!(matches!(output.next, NextDirective::UseGraphEdges));
    }
}
