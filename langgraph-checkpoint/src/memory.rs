//! An in-memory, `Queryable`-tier [`CheckpointStore`] for tests and
//! single-process deployments. Checkpoints are kept per thread in
//! insertion order; nothing survives process exit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::checkpoint::{Checkpoint, CheckpointSummary};
use crate::error::Result;
use crate::traits::CheckpointStore;

/// Checkpoints kept per thread, oldest first, so `load_latest` is a
/// `last()` and `list_checkpoints` just reverses.
type ThreadHistory = HashMap<String, Vec<Checkpoint>>;

/// In-memory checkpoint store. Clone shares the underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Arc<RwLock<ThreadHistory>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop all stored checkpoints. Useful for test isolation between
    /// scenarios sharing one store instance.
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            checkpoint_id = %checkpoint.id,
            step = checkpoint.step_index,
            "checkpoint saved"
        );
        let mut storage = self.storage.write().await;
        storage
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        let found = storage.get(thread_id).and_then(|history| history.last()).cloned();
        match &found {
            Some(cp) => tracing::debug!(thread_id = %thread_id, checkpoint_id = %cp.id, step = cp.step_index, "checkpoint loaded"),
            None => tracing::debug!(thread_id = %thread_id, "no checkpoint found for thread"),
        }
        Ok(found)
    }

    async fn list_checkpoints(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointSummary>> {
        let storage = self.storage.read().await;
        let history = storage.get(thread_id);
        let mut summaries: Vec<CheckpointSummary> = history
            .map(|entries| entries.iter().rev().map(CheckpointSummary::from).collect())
            .unwrap_or_default();
        if let Some(limit) = limit {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }

    async fn load_checkpoint(&self, thread_id: &str, id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|history| history.iter().find(|cp| cp.id == id))
            .cloned())
    }
}
