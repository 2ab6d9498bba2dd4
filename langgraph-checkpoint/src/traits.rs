//! The checkpoint store abstraction and its capability tiers
//! (`spec.md` §6 "Checkpoint store (consumed, optional)").

use async_trait::async_trait;

use crate::checkpoint::{Checkpoint, CheckpointSummary};
use crate::error::{CheckpointError, Result};

/// A probe thread id guaranteed not to exist, used to discover which
/// capability tier a store implements without relying on a declared
/// constant (`spec.md` §6: "Capability is discovered by probing with a
/// known-absent thread id.").
pub const CAPABILITY_PROBE_THREAD: &str = "__hsw_capability_probe__";

/// The three capability tiers a checkpoint store may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointCapability {
    /// No store configured at all.
    Unavailable,
    /// `save`/`load_latest` supported; history queries fail `unsupported`.
    LatestOnly,
    /// Full history: `list_checkpoints`/`load_checkpoint` supported too.
    Queryable,
}

/// Consumed, optional durable store for checkpoints. Implementations
/// need only provide `save` and `load_latest`; `list_checkpoints` and
/// `load_checkpoint` default to `Unsupported`, which makes a bare
/// `LatestOnly` implementation correct by construction.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint. Checkpoints are immutable once written
    /// (`spec.md` §3 lifecycle table: "Mutated by: never after write").
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load the most recent checkpoint for a thread, or `None` if the
    /// thread has never been checkpointed.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// List checkpoint summaries for a thread, most recent first.
    /// `Queryable` stores override this; `LatestOnly` stores inherit the
    /// `Unsupported` default.
    async fn list_checkpoints(
        &self,
        _thread_id: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<CheckpointSummary>> {
        Err(CheckpointError::Unsupported("listCheckpoints".to_string()))
    }

    /// Load one specific checkpoint by id. `Queryable` stores override
    /// this; `LatestOnly` stores inherit the `Unsupported` default.
    async fn load_checkpoint(&self, _thread_id: &str, _id: &str) -> Result<Option<Checkpoint>> {
        Err(CheckpointError::Unsupported("loadCheckpoint".to_string()))
    }
}

/// Discover a store's capability tier by probing `list_checkpoints`
/// against [`CAPABILITY_PROBE_THREAD`], per `spec.md` §6. Callers should
/// not assume a tier from the store's type; always probe.
pub async fn probe_capability(store: &dyn CheckpointStore) -> CheckpointCapability {
    match store.list_checkpoints(CAPABILITY_PROBE_THREAD, Some(1)).await {
        Ok(_) => CheckpointCapability::Queryable,
        Err(CheckpointError::Unsupported(_)) => CheckpointCapability::LatestOnly,
        Err(_) => CheckpointCapability::LatestOnly,
    }
}
