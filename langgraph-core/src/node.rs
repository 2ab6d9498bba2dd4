//! The node handler contract (`spec.md` §4.3 step 2–3).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event::EventEmitter;
use crate::ids::{NodeId, RunId, TaskOrdinal, ThreadId};
use crate::store::{Store, WriteBatch};

/// A node's request to suspend the run, carrying a typed-by-convention
/// payload (e.g. `toolApprovalRequired`). `kind` names the payload
/// shape for the canonical transcript projection.
#[derive(Debug, Clone)]
pub struct InterruptRequest {
    pub kind: String,
    pub payload: Value,
}

impl InterruptRequest {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// What the scheduler does with the frontier after this node completes.
#[derive(Debug, Clone)]
pub enum NextDirective {
    /// Use the graph's static edges from this node.
    UseGraphEdges,
    /// Schedule exactly these nodes next, overriding static edges.
    Nodes(Vec<NodeId>),
    /// This branch of the frontier terminates.
    End,
}

/// What a node handler returns: writes to merge, where to go next, and
/// an optional request to suspend the run.
#[derive(Clone)]
pub struct NodeOutput {
    pub writes: WriteBatch,
    pub next: NextDirective,
    pub interrupt: Option<InterruptRequest>,
}

impl NodeOutput {
    pub fn commit(writes: WriteBatch, next: NextDirective) -> Self {
        Self {
            writes,
            next,
            interrupt: None,
        }
    }

    pub fn interrupt(request: InterruptRequest) -> Self {
        Self {
            writes: WriteBatch::new(),
            next: NextDirective::End,
            interrupt: Some(request),
        }
    }
}

/// Run/task context plus a read-only store view, handed to every node
/// invocation.
pub struct NodeInput {
    pub store: Arc<Store>,
    pub run_id: RunId,
    pub thread_id: ThreadId,
    pub step_index: u64,
    pub task_id: String,
    pub task_ordinal: TaskOrdinal,
    pub node_id: NodeId,
    /// Set to the payload supplied to `resume` for exactly the nodes
    /// the interrupt suspended (`spec.md` §4.4 step 4).
    pub resume: Option<Value>,
    pub events: EventEmitter,
    pub cancellation: CancellationToken,
}

/// A graph node's handler.
#[async_trait]
pub trait Node: Send + Sync {
    async fn invoke(&self, input: NodeInput) -> Result<NodeOutput>;
}
