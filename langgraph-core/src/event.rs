//! The deterministic, schema-versioned event bus (`spec.md` §4.5).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, RuntimeError};
use crate::ids::{NodeId, TaskOrdinal};

/// The constant schema tag every event is decorated with.
pub const EVENT_SCHEMA_VERSION: &str = "hsw.v1";

const METADATA_SCHEMA_KEY: &str = "eventSchemaVersion";

/// A runtime-observable action. Variant names match the canonical
/// names used in `spec.md` so they read straight across into the
/// transcript projection (`crate::hash`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventKind {
    RunStarted,
    RunFinished,
    RunInterrupted { interrupt_id: String },
    RunResumed { interrupt_id: String },
    RunCancelled,
    CancelledAfterCheckpointSaved { checkpoint_id: String },
    CancelledWithoutCheckpoint { latest_checkpoint_id: Option<String> },
    StepStarted { step: u64, frontier_count: usize },
    StepFinished { step: u64, next_frontier_count: usize },
    TaskFailed { node_id: NodeId, error_description: String },
    WriteApplied { channel_id: String },
    CheckpointSaved { id: String },
    CheckpointLoaded { id: String },
    ModelInvocationStarted,
    ModelInvocationFinished,
    ModelToken { text: String },
    ToolInvocationStarted { name: String, tool_call_id: String },
    ToolInvocationFinished { name: String, success: bool, tool_call_id: String },
    CacheHit { node_id: NodeId },
    CacheMiss { node_id: NodeId },
    StreamBackpressure { dropped_model_tokens: u64, dropped_debug_events: u64 },
    CustomDebug { tag: String, detail: Value },
}

impl EventKind {
    /// `modelToken` and `customDebug` are the only droppable kinds
    /// (`spec.md` §4.5); every other kind blocks the producer when the
    /// buffer is full.
    fn is_droppable(&self) -> bool {
        matches!(self, EventKind::ModelToken { .. } | EventKind::CustomDebug { .. })
    }
}

/// One entry on the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_index: u64,
    pub step_index: Option<u64>,
    pub task_ordinal: Option<TaskOrdinal>,
    pub kind: EventKind,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Default)]
struct DropCounters {
    dropped_model_tokens: u64,
    dropped_debug_events: u64,
}

/// The bounded event bus one run drives. Clone is cheap; every clone
/// shares the same receiver-side channel and drop counters.
pub struct EventBus {
    sender: mpsc::Sender<Event>,
    next_index: AtomicU64,
    drops: Mutex<DropCounters>,
}

impl EventBus {
    /// Creates a bus with the given bounded capacity, returning the
    /// bus and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Arc::new(Self {
                sender,
                next_index: AtomicU64::new(0),
                drops: Mutex::new(DropCounters::default()),
            }),
            receiver,
        )
    }

    fn next_metadata() -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_SCHEMA_KEY.to_string(), Value::from(EVENT_SCHEMA_VERSION));
        metadata
    }

    async fn deliver(&self, step_index: Option<u64>, task_ordinal: Option<TaskOrdinal>, kind: EventKind) {
        let event = Event {
            event_index: self.next_index.fetch_add(1, Ordering::SeqCst),
            step_index,
            task_ordinal,
            kind,
            metadata: Self::next_metadata(),
        };
        // The receiver may have been dropped (run already finished);
        // emission after that point is a no-op.
        let _ = self.sender.send(event).await;
    }

    /// Emits `kind`, blocking the caller if the buffer is full and
    /// `kind` is not droppable; coalescing into `streamBackpressure`
    /// otherwise.
    pub async fn emit(&self, step_index: Option<u64>, task_ordinal: Option<TaskOrdinal>, kind: EventKind) {
        if kind.is_droppable() {
            let event = Event {
                event_index: self.next_index.fetch_add(1, Ordering::SeqCst),
                step_index,
                task_ordinal,
                kind: kind.clone(),
                metadata: Self::next_metadata(),
            };
            if self.sender.try_send(event).is_err() {
                let mut drops = self.drops.lock().await;
                match kind {
                    EventKind::ModelToken { .. } => drops.dropped_model_tokens += 1,
                    EventKind::CustomDebug { .. } => drops.dropped_debug_events += 1,
                    _ => unreachable!("is_droppable() only true for these two kinds"),
                }
            }
            return;
        }

        self.flush_backpressure_notice(step_index, task_ordinal).await;
        self.deliver(step_index, task_ordinal, kind).await;
    }

    async fn flush_backpressure_notice(&self, step_index: Option<u64>, task_ordinal: Option<TaskOrdinal>) {
        let counts = {
            let mut drops = self.drops.lock().await;
            if drops.dropped_model_tokens == 0 && drops.dropped_debug_events == 0 {
                return;
            }
            let counts = (drops.dropped_model_tokens, drops.dropped_debug_events);
            drops.dropped_model_tokens = 0;
            drops.dropped_debug_events = 0;
            counts
        };
        self.deliver(
            step_index,
            task_ordinal,
            EventKind::StreamBackpressure {
                dropped_model_tokens: counts.0,
                dropped_debug_events: counts.1,
            },
        )
        .await;
    }
}

/// A cheap handle nodes use to emit events scoped to their step/task,
/// without needing to know the run's current step index themselves.
#[derive(Clone)]
pub struct EventEmitter {
    bus: Arc<EventBus>,
    step_index: Option<u64>,
    task_ordinal: Option<TaskOrdinal>,
}

impl EventEmitter {
    pub fn new(bus: Arc<EventBus>, step_index: Option<u64>, task_ordinal: Option<TaskOrdinal>) -> Self {
        Self {
            bus,
            step_index,
            task_ordinal,
        }
    }

    pub async fn emit(&self, kind: EventKind) {
        self.bus.emit(self.step_index, self.task_ordinal, kind).await;
    }

    /// Scopes the emitter to the given task ordinal, keeping the step.
    pub fn for_task(&self, task_ordinal: TaskOrdinal) -> Self {
        Self {
            bus: self.bus.clone(),
            step_index: self.step_index,
            task_ordinal: Some(task_ordinal),
        }
    }
}

/// Validates that every event in a replayed stream carries a known
/// schema version (`spec.md` §4.5, §8 scenario 6).
pub fn validate_replay(events: &[Event]) -> Result<()> {
    for event in events {
        match event.metadata.get(METADATA_SCHEMA_KEY) {
            None => return Err(RuntimeError::MissingSchemaVersion(event.event_index)),
            Some(Value::String(found)) if found == EVENT_SCHEMA_VERSION => {}
            Some(found) => {
                return Err(RuntimeError::IncompatibleSchemaVersion {
                    expected: EVENT_SCHEMA_VERSION.to_string(),
                    found: found.to_string(),
                    index: event.event_index,
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_droppable_events_are_never_lost_even_when_full() {
        let (bus, mut rx) = EventBus::new(1);
        bus.emit(None, None, EventKind::RunStarted).await;
        let bus2 = bus.clone();
        let handle = tokio::spawn(async move {
            bus2.emit(Some(0), None, EventKind::RunFinished).await;
        });
        let first = rx.recv().await.unwrap();
        assert!(matches!(first.kind, EventKind::RunStarted));
        handle.await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.kind, EventKind::RunFinished));
    }

    #[tokio::test]
    async fn every_event_carries_schema_version() {
        let (bus, mut rx) = EventBus::new(4);
        bus.emit(None, None, EventKind::RunStarted).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.metadata.get(METADATA_SCHEMA_KEY),
            Some(&Value::from(EVENT_SCHEMA_VERSION))
        );
    }

    #[test]
    fn validate_replay_flags_missing_and_incompatible_versions() {
        let mut ok_event = Event {
            event_index: 0,
            step_index: None,
            task_ordinal: None,
            kind: EventKind::RunStarted,
            metadata: EventBus::next_metadata(),
        };
        assert!(validate_replay(std::slice::from_ref(&ok_event)).is_ok());

        ok_event.metadata.remove(METADATA_SCHEMA_KEY);
        let err = validate_replay(std::slice::from_ref(&ok_event));
        assert!(matches!(err, Err(RuntimeError::MissingSchemaVersion(0))));

        ok_event.metadata.insert(METADATA_SCHEMA_KEY.to_string(), Value::from("hsw.v0"));
        let err = validate_replay(std::slice::from_ref(&ok_event));
        assert!(matches!(err, Err(RuntimeError::IncompatibleSchemaVersion { .. })));
    }
}
