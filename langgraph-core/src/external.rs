//! The external-collaborator surface (`spec.md` §6): the traits a
//! caller implements to plug in a model, a tool registry, a clock, a
//! tokenizer, and a checkpoint store, plus the external-write admission
//! path that lets a caller mutate a thread's store between steps.

use crate::error::{Result, RuntimeError};
use crate::state::StateTracker;
use crate::store::{Store, WriteBatch};

pub use crate::clock::{Clock, SimulatedClock, SystemClock};
pub use crate::model::{ModelClient, ModelRequest, ModelResponse, StreamEvent};
pub use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};
pub use crate::tool::{StaticToolRegistry, StaticToolRegistryBuilder, ToolDefinition, ToolRegistry, ToolResult};
pub use langgraph_checkpoint::CheckpointStore;

/// Admits a batch of externally-submitted writes against `thread_id`'s
/// store, going through the same commit path the scheduler uses
/// (`store.apply_external`), and failing `interrupt-pending` if the
/// tracker shows an unresolved interruption for this thread (`spec.md`
/// §4.1 "Validation for external writes", §5 "Shared resources").
pub async fn apply_external_writes(store: &Store, tracker: &StateTracker, thread_id: &str, batch: WriteBatch) -> Result<Vec<String>> {
    if let Some(interrupt_id) = tracker.interruption_of(thread_id).await {
        return Err(RuntimeError::InterruptPending(interrupt_id));
    }
    store.apply_external(batch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelSpec, Persistence, Scope, UpdatePolicy};
    use crate::event::{Event, EventKind};
    use crate::schema::SchemaBuilder;
    use serde_json::Value;
    use std::sync::Arc;

    fn schema() -> Arc<crate::schema::Schema> {
        Arc::new(
            SchemaBuilder::default()
                .channel(ChannelSpec::last_write_wins(
                    "counter",
                    Scope::Global,
                    UpdatePolicy::Single,
                    Persistence::Checkpointed,
                    "string",
                    || Option::<String>::None,
                ))
                .build(),
        )
    }

    #[tokio::test]
    async fn admits_writes_when_no_interrupt_is_pending() {
        let store = Store::new(schema());
        let tracker = StateTracker::new();
        let mut batch = WriteBatch::new();
        batch.push("counter", Value::from("hi"));
        let touched = apply_external_writes(&store, &tracker, "t1", batch).await.unwrap();
        assert_eq!(touched, vec!["counter".to_string()]);
    }

    #[tokio::test]
    async fn rejects_writes_while_interrupt_is_pending() {
        let store = Store::new(schema());
        let tracker = StateTracker::new();
        let interrupted = Event {
            event_index: 0,
            step_index: None,
            task_ordinal: None,
            kind: EventKind::RunInterrupted { interrupt_id: "int-1".to_string() },
            metadata: Default::default(),
        };
        tracker.record("t1", &interrupted).await;

        let mut batch = WriteBatch::new();
        batch.push("counter", Value::from("hi"));
        let err = apply_external_writes(&store, &tracker, "t1", batch).await;
        assert!(matches!(err, Err(RuntimeError::InterruptPending(id)) if id == "int-1"));
    }
}
