//! Identifier types and the deterministic id schemes (`spec.md` §3, §4.7.1).

use sha2::{Digest, Sha256};

use crate::error::{Result, RuntimeError};

/// A run identifier: a fresh UUID per run.
pub type RunId = String;

/// A thread identifier, caller-chosen and stable across resumes.
pub type ThreadId = String;

/// A checkpoint identifier, assigned monotonically per `(thread, step)`.
pub type CheckpointId = String;

/// A node id as declared in the compiled graph.
pub type NodeId = String;

/// A task ordinal within a step, used for frontier ordering and event
/// projection (`spec.md` §5).
pub type TaskOrdinal = u32;

/// An interrupt identifier, scoped to the thread that raised it.
pub type InterruptId = String;

/// A deterministic hash of `(run-id, step-index, node-id, task-ordinal)`,
/// seeding deterministic child identifiers such as message ids.
pub fn task_id(run_id: &str, step_index: u64, node_id: &str, task_ordinal: TaskOrdinal) -> String {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(step_index.to_be_bytes());
    hasher.update(b"\0");
    hasher.update(node_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(task_ordinal.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn step_index_u32(step_index: u64) -> Result<u32> {
    step_index
        .try_into()
        .map_err(|_| RuntimeError::InvalidStepIndex(step_index))
}

/// The `HMSG1` id minted for a `user` message: `sha256("HMSG1" ||
/// runID || u32be(stepIndex) || "user" || u32be(0))`, hex-encoded and
/// prefixed `"msg:"`.
pub fn user_message_id(run_id: &str, step_index: u64) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(b"HMSG1");
    hasher.update(run_id.as_bytes());
    hasher.update(step_index_u32(step_index)?.to_be_bytes());
    hasher.update(b"user");
    hasher.update(0u32.to_be_bytes());
    Ok(format!("msg:{}", hex::encode(hasher.finalize())))
}

/// The `HMSG1` id minted for an `assistant`/`system` message: `sha256(
/// "HMSG1" || taskID || 0x00 || role || u32be(0))`, hex-encoded and
/// prefixed `"msg:"`.
pub fn assistant_message_id(task_id: &str, role: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"HMSG1");
    hasher.update(task_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(role.as_bytes());
    hasher.update(0u32.to_be_bytes());
    format!("msg:{}", hex::encode(hasher.finalize()))
}

/// The id of a tool response message: `"tool:" + call.id`, or
/// `"tool:" + call.id + ":cancelled"` for a cancellation synthesis.
pub fn tool_message_id(call_id: &str, cancelled: bool) -> String {
    if cancelled {
        format!("tool:{call_id}:cancelled")
    } else {
        format!("tool:{call_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_id_is_deterministic() {
        let a = user_message_id("run-1", 3).unwrap();
        let b = user_message_id("run-1", 3).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("msg:"));
    }

    #[test]
    fn user_message_id_rejects_oversized_step() {
        let err = user_message_id("run-1", u64::from(u32::MAX) + 1);
        assert!(matches!(err, Err(RuntimeError::InvalidStepIndex(_))));
    }

    #[test]
    fn assistant_message_id_varies_by_role() {
        let tid = task_id("run-1", 0, "model", 0);
        let assistant = assistant_message_id(&tid, "assistant");
        let system = assistant_message_id(&tid, "system");
        assert_ne!(assistant, system);
    }

    #[test]
    fn tool_message_id_marks_cancellation() {
        assert_eq!(tool_message_id("c1", false), "tool:c1");
        assert_eq!(tool_message_id("c1", true), "tool:c1:cancelled");
    }

    #[test]
    fn task_id_varies_with_every_component() {
        let base = task_id("run-1", 0, "model", 0);
        assert_ne!(base, task_id("run-2", 0, "model", 0));
        assert_ne!(base, task_id("run-1", 1, "model", 0));
        assert_ne!(base, task_id("run-1", 0, "tools", 0));
        assert_ne!(base, task_id("run-1", 0, "model", 1));
    }
}
