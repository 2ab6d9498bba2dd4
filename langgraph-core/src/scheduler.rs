//! The step scheduler (`spec.md` §4.3): frontier management, deferred
//! carryover, bounded-concurrency execution, interrupt bubbling, and
//! transactional write merge.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{fingerprint, NodeCache};
use crate::error::{Result, RuntimeError};
use crate::event::{EventBus, EventEmitter, EventKind};
use crate::graph::{CompiledGraph, RouterDecision};
use crate::ids::{task_id as derive_task_id, NodeId, RunId, TaskOrdinal, ThreadId};
use crate::node::{InterruptRequest, NextDirective, NodeInput, NodeOutput};
use crate::store::{Store, WriteBatch};

/// One member of the scheduling frontier: the node to run, why it was
/// scheduled, and whether it already waited out one step as a deferred
/// node (and is therefore ready regardless of its `deferred` flag).
#[derive(Debug, Clone)]
pub struct FrontierMember {
    pub node_id: NodeId,
    pub provenance: String,
    pub carried_over: bool,
}

impl FrontierMember {
    pub fn new(node_id: impl Into<String>, provenance: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            provenance: provenance.into(),
            carried_over: false,
        }
    }
}

/// What running one step produced.
pub enum StepOutcome {
    /// The step committed (possibly a pure deferred-carryover step with
    /// no handlers invoked). `next_frontier` may be empty, meaning the
    /// run has no more work.
    Committed { next_frontier: Vec<FrontierMember> },
    /// A handler requested an interrupt; nothing from this step
    /// committed and the remaining concurrent handlers were cancelled.
    Interrupted {
        request: InterruptRequest,
        interrupted_nodes: Vec<NodeId>,
    },
}

/// Drives one compiled graph's nodes through successive steps over one
/// store. Owned by a single run; not shared across runs.
pub struct Scheduler {
    graph: Arc<CompiledGraph>,
    store: Arc<Store>,
    events: Arc<EventBus>,
    caches: HashMap<NodeId, NodeCache>,
    max_concurrent_tasks: usize,
}

impl Scheduler {
    pub fn new(graph: Arc<CompiledGraph>, store: Arc<Store>, events: Arc<EventBus>, max_concurrent_tasks: usize) -> Self {
        let mut caches = HashMap::new();
        for node_id in graph.node_ids() {
            if let Some(node) = graph.node(node_id) {
                if let Some(policy) = &node.cache_policy {
                    caches.insert(node_id.to_string(), NodeCache::new(policy.capacity));
                }
            }
        }
        Self {
            graph,
            store,
            events,
            caches,
            max_concurrent_tasks: max_concurrent_tasks.max(1),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }

    /// Hashes the current store snapshot into the per-frontier-member
    /// `local-fingerprint` `spec.md` §4.3 names: a hash of `(node-id,
    /// graph-version, channel values)` over every channel, computed at
    /// the point a node is added to the frontier.
    pub async fn current_fingerprint(&self, node_id: &str) -> String {
        let entries = self.store.channel_entries().await;
        let refs: Vec<(&str, &Value)> = entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        fingerprint(node_id, self.graph.graph_version(), &refs)
    }

    /// Runs one step: partitions the frontier into ready/deferred-carry,
    /// executes ready handlers concurrently (bounded by
    /// `max_concurrent_tasks`), merges their writes transactionally, and
    /// resolves the next frontier via static edges, node-supplied
    /// next-directives, and attached routers.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_step(
        &self,
        step_index: u64,
        frontier: Vec<FrontierMember>,
        resume_payloads: &HashMap<NodeId, Value>,
        run_id: &RunId,
        thread_id: &ThreadId,
        cancellation: &CancellationToken,
    ) -> Result<StepOutcome> {
        let mut ready: Vec<FrontierMember> = Vec::new();
        let mut deferred_carry: Vec<FrontierMember> = Vec::new();
        for member in frontier {
            let node = self
                .graph
                .node(&member.node_id)
                .ok_or_else(|| RuntimeError::GraphValidation(format!("unknown node {}", member.node_id)))?;
            if node.deferred && !member.carried_over {
                deferred_carry.push(FrontierMember {
                    carried_over: true,
                    ..member
                });
            } else {
                ready.push(member);
            }
        }
        ready.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        tracing::debug!(
            step = step_index,
            ready = ready.len(),
            deferred_carried_over = deferred_carry.len(),
            "running step"
        );

        self.events
            .emit(
                Some(step_index),
                None,
                EventKind::StepStarted {
                    step: step_index,
                    frontier_count: ready.len() + deferred_carry.len(),
                },
            )
            .await;

        if ready.is_empty() {
            self.events
                .emit(
                    Some(step_index),
                    None,
                    EventKind::StepFinished {
                        step: step_index,
                        next_frontier_count: deferred_carry.len(),
                    },
                )
                .await;
            return Ok(StepOutcome::Committed {
                next_frontier: deferred_carry,
            });
        }

        let step_cancel = cancellation.child_token();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));
        let step_events = EventEmitter::new(self.events.clone(), Some(step_index), None);

        let mut tasks = FuturesUnordered::new();
        // Fingerprint computed before this node ran, for cache insertion
        // once its output is known (must match the key used on lookup).
        let mut pending_cache_keys: HashMap<NodeId, String> = HashMap::new();
        for (ordinal, member) in ready.iter().enumerate() {
            let task_ordinal = ordinal as TaskOrdinal;
            let node = self.graph.node(&member.node_id).expect("validated above");
            let handler = node.handler.clone();
            let cache_policy = node.cache_policy.clone();
            let node_id = member.node_id.clone();

            if let Some(policy) = &cache_policy {
                let mut keyed = Vec::with_capacity(policy.fingerprint_channels.len());
                for channel in &policy.fingerprint_channels {
                    keyed.push((channel.as_str(), self.store.get(channel).await?));
                }
                let refs: Vec<(&str, &Value)> = keyed.iter().map(|(c, v)| (*c, v)).collect();
                let key = fingerprint(&node_id, self.graph.graph_version(), &refs);
                if let Some(cache) = self.caches.get(&node_id) {
                    if let Some(cached) = cache.get(&key) {
                        step_events.emit(EventKind::CacheHit { node_id: node_id.clone() }).await;
                        let node_id_for_task = node_id.clone();
                        tasks.push(tokio::spawn(async move { (node_id_for_task, Ok(cached)) }));
                        continue;
                    }
                    step_events.emit(EventKind::CacheMiss { node_id: node_id.clone() }).await;
                    pending_cache_keys.insert(node_id.clone(), key);
                }
            }

            let task_id = derive_task_id(run_id, step_index, &node_id, task_ordinal);
            let input = NodeInput {
                store: self.store.clone(),
                run_id: run_id.clone(),
                thread_id: thread_id.clone(),
                step_index,
                task_id,
                task_ordinal,
                node_id: node_id.clone(),
                resume: resume_payloads.get(&node_id).cloned(),
                events: step_events.for_task(task_ordinal),
                cancellation: step_cancel.child_token(),
            };
            let semaphore = semaphore.clone();
            let node_id_for_task = node_id.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let output = handler.invoke(input).await;
                (node_id_for_task, output)
            }));
        }

        let mut outputs: HashMap<NodeId, NodeOutput> = HashMap::new();
        let mut errors: HashMap<NodeId, RuntimeError> = HashMap::new();
        let mut interrupted: Option<(NodeId, InterruptRequest)> = None;

        while let Some(joined) = tasks.next().await {
            let (node_id, result) = joined.expect("node task panicked");
            match result {
                Ok(output) => {
                    if interrupted.is_none() {
                        if let Some(request) = &output.interrupt {
                            interrupted = Some((node_id.clone(), request.clone()));
                            step_cancel.cancel();
                        }
                    }
                    outputs.insert(node_id, output);
                }
                Err(error) => {
                    errors.insert(node_id, error);
                }
            }
        }

        if let Some((node_id, request)) = interrupted {
            tracing::info!(step = step_index, node_id = %node_id, kind = %request.kind, "node requested interrupt");
            return Ok(StepOutcome::Interrupted {
                request,
                interrupted_nodes: vec![node_id],
            });
        }

        if !errors.is_empty() {
            let mut failed: Vec<&NodeId> = errors.keys().collect();
            failed.sort();
            let first = failed[0].clone();
            let error = errors.remove(&first).expect("just selected");
            tracing::warn!(step = step_index, node_id = %first, error = %error, "node task failed");
            self.events
                .emit(
                    Some(step_index),
                    None,
                    EventKind::TaskFailed {
                        node_id: first,
                        error_description: error.to_string(),
                    },
                )
                .await;
            return Err(error);
        }

        // Populate caches using the fingerprint computed before each node
        // ran, so the key matches what a future lookup will compute.
        for (node_id, key) in pending_cache_keys {
            if let (Some(cache), Some(output)) = (self.caches.get(&node_id), outputs.get(&node_id)) {
                cache.put(key, output.clone());
            }
        }

        let mut combined = WriteBatch::new();
        for output in outputs.values() {
            combined.0.extend(output.writes.0.clone());
        }
        self.store.apply(combined).await?;

        let mut next_frontier: Vec<(NodeId, String)> = Vec::new();
        let mut sorted_node_ids: Vec<&NodeId> = outputs.keys().collect();
        sorted_node_ids.sort();
        for node_id in sorted_node_ids {
            let output = &outputs[node_id];
            let resolved = match &output.next {
                NextDirective::End => Vec::new(),
                NextDirective::Nodes(ids) => ids.iter().map(|id| (id.clone(), node_id.clone())).collect(),
                NextDirective::UseGraphEdges => {
                    if let Some(router) = self.graph.router_from(node_id) {
                        match router.route(&self.store).await? {
                            RouterDecision::End => Vec::new(),
                            RouterDecision::Nodes(ids) => ids.into_iter().map(|id| (id, node_id.clone())).collect(),
                            RouterDecision::UseGraphEdges => self
                                .graph
                                .static_edges_from(node_id)
                                .iter()
                                .map(|id| (id.clone(), node_id.clone()))
                                .collect(),
                        }
                    } else {
                        self.graph
                            .static_edges_from(node_id)
                            .iter()
                            .map(|id| (id.clone(), node_id.clone()))
                            .collect()
                    }
                }
            };
            next_frontier.extend(resolved);
        }

        next_frontier.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        next_frontier.dedup_by(|a, b| a.0 == b.0);

        self.store.reset_ephemeral().await;

        let mut next: Vec<FrontierMember> = deferred_carry;
        next.extend(next_frontier.into_iter().map(|(id, provenance)| FrontierMember::new(id, provenance)));
        next.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        tracing::debug!(step = step_index, next_frontier = next.len(), "step committed");

        self.events
            .emit(
                Some(step_index),
                None,
                EventKind::StepFinished {
                    step: step_index,
                    next_frontier_count: next.len(),
                },
            )
            .await;

        Ok(StepOutcome::Committed { next_frontier: next })
    }
}
