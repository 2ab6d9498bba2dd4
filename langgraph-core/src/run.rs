//! Ties the scheduler, checkpoint store, and event bus into one driven
//! run: `RunOptions`, `RunHandle`, and the `Runtime` that executes
//! `start`/`resume` (`spec.md` §4.4, §5, §6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::channel::Scope;
use crate::error::{Result, RuntimeError};
use crate::event::{Event, EventBus, EventKind, EVENT_SCHEMA_VERSION};
use crate::graph::CompiledGraph;
use crate::ids::{CheckpointId, InterruptId, RunId, ThreadId};
use crate::interrupt::validate_resume;
use crate::node::InterruptRequest;
use crate::schema::Schema;
use crate::scheduler::{FrontierMember, Scheduler, StepOutcome};
use crate::state::StateTracker;
use crate::store::{Store, WriteBatch};
use langgraph_checkpoint::{Checkpoint, CheckpointFormatVersion, CheckpointStore, FrontierEntry, PendingInterrupt};

/// `{maxSteps ≥ 0, maxConcurrentTasks ≥ 1, eventBufferCapacity ≥ 1,
/// checkpointPolicy, outputProjectionOverride?}` (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_steps: u64,
    pub max_concurrent_tasks: usize,
    pub event_buffer_capacity: usize,
    pub checkpoint_policy: CheckpointPolicy,
    pub output_projection_override: Option<OutputProjection>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: 256,
            max_concurrent_tasks: 4,
            event_buffer_capacity: 256,
            checkpoint_policy: CheckpointPolicy::Disabled,
            output_projection_override: None,
        }
    }
}

impl RunOptions {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(RuntimeError::InvalidRunOptions("maxConcurrentTasks must be >= 1".to_string()));
        }
        if self.event_buffer_capacity == 0 {
            return Err(RuntimeError::InvalidRunOptions("eventBufferCapacity must be >= 1".to_string()));
        }
        if let CheckpointPolicy::Every(n) = self.checkpoint_policy {
            if n == 0 {
                return Err(RuntimeError::InvalidRunOptions("checkpointPolicy every(n) requires n >= 1".to_string()));
            }
        }
        Ok(())
    }
}

/// When the runtime saves a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    Disabled,
    EveryStep,
    Every(u32),
    OnInterrupt,
}

impl CheckpointPolicy {
    fn due_after_step(&self, step_index: u64) -> bool {
        match self {
            CheckpointPolicy::Disabled | CheckpointPolicy::OnInterrupt => false,
            CheckpointPolicy::EveryStep => true,
            CheckpointPolicy::Every(n) => (step_index + 1) % u64::from(*n) == 0,
        }
    }

    fn saves_on_interrupt(&self) -> bool {
        !matches!(self, CheckpointPolicy::Disabled)
    }
}

/// Which channels a finished run's output projects.
#[derive(Debug, Clone)]
pub enum OutputProjection {
    /// Adopt every channel in the store.
    FullStore,
    /// Project exactly these (global) channels.
    Channels(Vec<String>),
}

/// The terminal result of a driven run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Finished { output: Value, checkpoint_id: Option<CheckpointId> },
    Interrupted { request: InterruptRequest, checkpoint_id: Option<CheckpointId> },
    Cancelled { output: Value, checkpoint_id: Option<CheckpointId> },
    OutOfSteps { step: u64, output: Value, checkpoint_id: Option<CheckpointId> },
}

/// `{runID, attemptID, events: stream, outcome: future}` (`spec.md` §6).
pub struct RunHandle {
    pub run_id: RunId,
    pub attempt_id: String,
    pub events: mpsc::Receiver<Event>,
    cancellation: CancellationToken,
    outcome_rx: oneshot::Receiver<Result<RunOutcome>>,
}

impl RunHandle {
    /// Cancels the run's cooperative token; in-flight handlers observe
    /// it on their next yield point (`spec.md` §5 "Cancellation").
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Awaits the run's terminal outcome.
    pub async fn outcome(self) -> Result<RunOutcome> {
        self.outcome_rx
            .await
            .map_err(|_| RuntimeError::InvalidRunOptions("run driver dropped before completing".to_string()))?
    }
}

fn project_output(store_entries: &[(String, Value)], projection: &OutputProjection) -> Value {
    match projection {
        OutputProjection::FullStore => {
            let map: serde_json::Map<String, Value> = store_entries.iter().cloned().collect();
            Value::Object(map)
        }
        OutputProjection::Channels(ids) => {
            let mut map = serde_json::Map::new();
            for id in ids {
                if let Some((_, value)) = store_entries.iter().find(|(k, _)| k == id) {
                    map.insert(id.clone(), value.clone());
                }
            }
            Value::Object(map)
        }
    }
}

/// Drives the compiled graph + scheduler over a store, owning the
/// checkpoint store and the preflight checks `spec.md` §7 names.
pub struct Runtime {
    graph: Arc<CompiledGraph>,
    schema: Arc<Schema>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    has_model_client: bool,
    has_tool_registry: bool,
    tracker: Arc<StateTracker>,
}

impl Runtime {
    pub fn new(graph: Arc<CompiledGraph>, schema: Arc<Schema>) -> Self {
        Self {
            graph,
            schema,
            checkpoint_store: None,
            has_model_client: false,
            has_tool_registry: false,
            tracker: Arc::new(StateTracker::new()),
        }
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Declares that the graph's `model` node(s) were wired with a live
    /// model client, satisfying the `model-client-missing` preflight.
    pub fn with_model_client(mut self) -> Self {
        self.has_model_client = true;
        self
    }

    /// Declares that the graph's `toolExecute` node(s) were wired with a
    /// live tool registry, satisfying the `tool-registry-missing` preflight.
    pub fn with_tool_registry(mut self) -> Self {
        self.has_tool_registry = true;
        self
    }

    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    fn preflight(&self, options: &RunOptions) -> Result<()> {
        options.validate()?;

        if self.graph.node_ids().any(|id| id == "model") && !self.has_model_client {
            return Err(RuntimeError::ModelClientMissing);
        }
        if self.graph.node_ids().any(|id| id == "toolExecute") && !self.has_tool_registry {
            return Err(RuntimeError::ToolRegistryMissing);
        }
        if options.checkpoint_policy != CheckpointPolicy::Disabled && self.checkpoint_store.is_none() {
            return Err(RuntimeError::CheckpointStoreMissing);
        }
        if let Some(OutputProjection::Channels(ids)) = &options.output_projection_override {
            for id in ids {
                let spec = self.schema.get(id)?;
                if spec.scope == Scope::TaskLocal {
                    return Err(RuntimeError::InvalidRunOptions(format!(
                        "output projection names task-local channel {id}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn output_projection(&self, options: &RunOptions) -> OutputProjection {
        options.output_projection_override.clone().unwrap_or(OutputProjection::FullStore)
    }

    /// Starts a fresh run on `thread_id`, applying `initial_writes` (e.g.
    /// the caller's user message) before the first step.
    pub async fn start(&self, thread_id: ThreadId, initial_writes: WriteBatch, options: RunOptions) -> Result<RunHandle> {
        self.preflight(&options)?;

        let store = Arc::new(Store::new(self.schema.clone()));
        store.apply(initial_writes).await?;

        let start_frontier: Vec<FrontierMember> = self
            .graph
            .start_set()
            .iter()
            .map(|id| FrontierMember::new(id.clone(), "__start__"))
            .collect();

        let (bus, events) = EventBus::new(options.event_buffer_capacity);
        bus.emit(None, None, EventKind::RunStarted).await;
        tracing::info!(thread_id = %thread_id, start_nodes = start_frontier.len(), "run starting");
        self.drive(thread_id, store, start_frontier, 0, HashMap::new(), options, bus, events).await
    }

    /// Loads the thread's latest checkpoint, validates the resume
    /// request against its pending interruption, rehydrates the store,
    /// and continues the run from the interrupted frontier (`spec.md`
    /// §4.4 step 2 onward).
    pub async fn resume(
        &self,
        thread_id: ThreadId,
        interrupt_id: InterruptId,
        payload: Value,
        options: RunOptions,
    ) -> Result<RunHandle> {
        self.preflight(&options)?;

        let checkpoint_store = self.checkpoint_store.as_ref().ok_or(RuntimeError::CheckpointStoreMissing)?;
        let checkpoint = checkpoint_store
            .load_latest(&thread_id)
            .await?
            .ok_or(RuntimeError::NoCheckpointToResume)?;

        let pending = validate_resume(&checkpoint, EVENT_SCHEMA_VERSION, self.graph.graph_version(), &interrupt_id)?.clone();

        let store = Arc::new(Store::new(self.schema.clone()));
        store.load_payloads(&checkpoint.store_payloads).await;

        let frontier: Vec<FrontierMember> = pending
            .interrupted_nodes
            .iter()
            .map(|node_id| FrontierMember {
                node_id: node_id.clone(),
                provenance: "__resume__".to_string(),
                carried_over: true,
            })
            .collect();

        let mut resume_payloads = HashMap::new();
        for node_id in &pending.interrupted_nodes {
            resume_payloads.insert(node_id.clone(), payload.clone());
        }

        let (bus, events) = EventBus::new(options.event_buffer_capacity);
        bus.emit(None, None, EventKind::RunResumed { interrupt_id }).await;
        tracing::info!(thread_id = %thread_id, resumed_step = checkpoint.step_index + 1, "run resuming from checkpoint");

        self.drive(thread_id, store, frontier, checkpoint.step_index + 1, resume_payloads, options, bus, events)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        thread_id: ThreadId,
        store: Arc<Store>,
        start_frontier: Vec<FrontierMember>,
        start_step: u64,
        resume_payloads: HashMap<String, Value>,
        options: RunOptions,
        bus: Arc<EventBus>,
        events: mpsc::Receiver<Event>,
    ) -> Result<RunHandle> {
        let run_id: RunId = uuid::Uuid::new_v4().to_string();
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let cancellation = CancellationToken::new();

        let (outcome_tx, outcome_rx) = oneshot::channel();

        let graph = self.graph.clone();
        let checkpoint_store = self.checkpoint_store.clone();
        let projection = self.output_projection(&options);
        let tracker = self.tracker.clone();

        let run_id_for_task = run_id.clone();
        let cancel_for_task = cancellation.clone();

        tokio::spawn(async move {
            let result = run_loop(
                graph,
                store,
                bus,
                tracker,
                checkpoint_store,
                run_id_for_task,
                thread_id,
                start_frontier,
                start_step,
                resume_payloads,
                options,
                cancel_for_task,
                projection,
            )
            .await;
            let _ = outcome_tx.send(result);
        });

        Ok(RunHandle {
            run_id,
            attempt_id,
            events,
            cancellation,
            outcome_rx,
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    graph: Arc<CompiledGraph>,
    store: Arc<Store>,
    bus: Arc<EventBus>,
    tracker: Arc<StateTracker>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    run_id: RunId,
    thread_id: ThreadId,
    mut frontier: Vec<FrontierMember>,
    mut step_index: u64,
    mut resume_payloads: HashMap<String, Value>,
    options: RunOptions,
    cancellation: CancellationToken,
    projection: OutputProjection,
) -> Result<RunOutcome> {
    let scheduler = Scheduler::new(graph, store.clone(), bus.clone(), options.max_concurrent_tasks);
    tracker.set_run_id(&thread_id, run_id.clone()).await;

    let mut last_saved_checkpoint_id: Option<CheckpointId> = None;
    let last_event_was_checkpoint = AtomicBool::new(false);

    loop {
        if frontier.is_empty() {
            bus.emit(None, None, EventKind::RunFinished).await;
            tracing::info!(thread_id = %thread_id, step = step_index, "run finished");
            let output = project_output(&store.channel_entries().await, &projection);
            return Ok(RunOutcome::Finished {
                output,
                checkpoint_id: last_saved_checkpoint_id,
            });
        }

        if cancellation.is_cancelled() {
            tracing::info!(thread_id = %thread_id, step = step_index, "run cancelled");
            let output = project_output(&store.channel_entries().await, &projection);
            return resolve_cancellation(&bus, last_event_was_checkpoint.load(Ordering::SeqCst), last_saved_checkpoint_id, output).await;
        }

        if step_index >= options.max_steps {
            tracing::warn!(thread_id = %thread_id, step = step_index, max_steps = options.max_steps, "run out of steps");
            let output = project_output(&store.channel_entries().await, &projection);
            return Ok(RunOutcome::OutOfSteps {
                step: step_index,
                output,
                checkpoint_id: last_saved_checkpoint_id,
            });
        }

        let outcome = scheduler
            .run_step(step_index, frontier, &resume_payloads, &run_id, &thread_id, &cancellation)
            .await?;
        resume_payloads.clear();
        last_event_was_checkpoint.store(false, Ordering::SeqCst);

        match outcome {
            StepOutcome::Interrupted { request, interrupted_nodes } => {
                let interrupt_id = uuid::Uuid::new_v4().to_string();
                let checkpoint_id = if options.checkpoint_policy.saves_on_interrupt() {
                    if let Some(checkpoint_store) = &checkpoint_store {
                        let interrupt_frontier: Vec<FrontierMember> =
                            interrupted_nodes.iter().map(|id| FrontierMember::new(id.clone(), "__interrupt__")).collect();
                        let pending = PendingInterrupt {
                            id: interrupt_id.clone(),
                            payload: request.payload.clone(),
                            interrupted_nodes: interrupted_nodes.clone(),
                        };
                        let id = save_checkpoint(&scheduler, checkpoint_store.as_ref(), &thread_id, &run_id, step_index, &interrupt_frontier, Some(pending))
                            .await?;
                        tracing::info!(thread_id = %thread_id, step = step_index, checkpoint_id = %id, "checkpoint saved on interrupt");
                        bus.emit(Some(step_index), None, EventKind::CheckpointSaved { id: id.clone() }).await;
                        last_event_was_checkpoint.store(true, Ordering::SeqCst);
                        tracker.record(&thread_id, &checkpoint_saved_event(step_index, &id)).await;
                        Some(id)
                    } else {
                        None
                    }
                } else {
                    None
                };
                tracing::info!(thread_id = %thread_id, step = step_index, interrupt_id = %interrupt_id, kind = %request.kind, "run interrupted");
                bus.emit(Some(step_index), None, EventKind::RunInterrupted { interrupt_id: interrupt_id.clone() }).await;
                tracker.record(&thread_id, &interrupted_event(step_index, &interrupt_id)).await;
                return Ok(RunOutcome::Interrupted { request, checkpoint_id });
            }
            StepOutcome::Committed { next_frontier } => {
                if options.checkpoint_policy.due_after_step(step_index) {
                    if let Some(checkpoint_store) = &checkpoint_store {
                        let id = save_checkpoint(&scheduler, checkpoint_store.as_ref(), &thread_id, &run_id, step_index, &next_frontier, None).await?;
                        tracing::debug!(thread_id = %thread_id, step = step_index, checkpoint_id = %id, "checkpoint saved");
                        bus.emit(Some(step_index), None, EventKind::CheckpointSaved { id: id.clone() }).await;
                        last_event_was_checkpoint.store(true, Ordering::SeqCst);
                        last_saved_checkpoint_id = Some(id.clone());
                        tracker.record(&thread_id, &checkpoint_saved_event(step_index, &id)).await;
                    }
                }
                frontier = next_frontier;
                step_index += 1;
            }
        }
    }
}

async fn resolve_cancellation(
    bus: &EventBus,
    last_event_was_checkpoint: bool,
    latest_checkpoint_id: Option<CheckpointId>,
    output: Value,
) -> Result<RunOutcome> {
    bus.emit(None, None, EventKind::RunCancelled).await;
    if last_event_was_checkpoint {
        if let Some(id) = &latest_checkpoint_id {
            bus.emit(None, None, EventKind::CancelledAfterCheckpointSaved { checkpoint_id: id.clone() }).await;
        }
    } else {
        bus.emit(
            None,
            None,
            EventKind::CancelledWithoutCheckpoint {
                latest_checkpoint_id: latest_checkpoint_id.clone(),
            },
        )
        .await;
    }
    Ok(RunOutcome::Cancelled {
        output,
        checkpoint_id: latest_checkpoint_id,
    })
}

fn checkpoint_saved_event(step_index: u64, id: &str) -> Event {
    Event {
        event_index: 0,
        step_index: Some(step_index),
        task_ordinal: None,
        kind: EventKind::CheckpointSaved { id: id.to_string() },
        metadata: Default::default(),
    }
}

fn interrupted_event(step_index: u64, interrupt_id: &str) -> Event {
    Event {
        event_index: 0,
        step_index: Some(step_index),
        task_ordinal: None,
        kind: EventKind::RunInterrupted {
            interrupt_id: interrupt_id.to_string(),
        },
        metadata: Default::default(),
    }
}

/// Saves a checkpoint of the scheduler's current store, tagging it with
/// the frontier about to run (or the nodes an interrupt suspended), per
/// `spec.md` §3 "Checkpoint" and §4.3's `local-fingerprint`.
async fn save_checkpoint(
    scheduler: &Scheduler,
    store_backend: &dyn CheckpointStore,
    thread_id: &str,
    run_id: &str,
    step_index: u64,
    frontier: &[FrontierMember],
    pending_interrupt: Option<PendingInterrupt>,
) -> Result<CheckpointId> {
    let mut frontier_entries = Vec::with_capacity(frontier.len());
    for member in frontier {
        let local_fingerprint = scheduler.current_fingerprint(&member.node_id).await;
        frontier_entries.push(FrontierEntry {
            node_id: member.node_id.clone(),
            provenance: member.provenance.clone(),
            local_fingerprint,
        });
    }

    let id = format!("{thread_id}:{step_index}");
    let checkpoint = Checkpoint {
        id: id.clone(),
        thread_id: thread_id.to_string(),
        run_id: run_id.to_string(),
        step_index,
        schema_version: EVENT_SCHEMA_VERSION.to_string(),
        graph_version: scheduler.graph().graph_version().to_string(),
        checkpoint_format_version: CheckpointFormatVersion::CURRENT,
        store_payloads: scheduler.store().checkpoint_payloads().await,
        frontier: frontier_entries,
        pending_interrupt,
    };
    store_backend.save(checkpoint).await?;
    Ok(id)
}
