//! The resume-side half of the interrupt/checkpoint state machine
//! (`spec.md` §4.4). Suspending a run is the scheduler's job
//! (`crate::scheduler`); this module validates a caller's `resume`
//! request against a loaded checkpoint.

use langgraph_checkpoint::{Checkpoint, PendingInterrupt};

use crate::error::{Result, RuntimeError};

/// Validates `resume(thread, interrupt_id, ...)` against the thread's
/// latest checkpoint, per `spec.md` §4.4 steps 2–3.
pub fn validate_resume<'a>(
    checkpoint: &'a Checkpoint,
    expected_schema_version: &str,
    expected_graph_version: &str,
    supplied_interrupt_id: &str,
) -> Result<&'a PendingInterrupt> {
    checkpoint.validate_for_resume(expected_schema_version, expected_graph_version)?;

    let pending = checkpoint.pending_interrupt.as_ref().ok_or(RuntimeError::NoInterruptToResume)?;

    if pending.id != supplied_interrupt_id {
        tracing::warn!(
            thread_id = %checkpoint.thread_id,
            expected = %pending.id,
            found = %supplied_interrupt_id,
            "resume interrupt id mismatch"
        );
        return Err(RuntimeError::ResumeInterruptMismatch {
            expected: pending.id.clone(),
            found: supplied_interrupt_id.to_string(),
        });
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use langgraph_checkpoint::CheckpointFormatVersion;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn checkpoint(pending: Option<PendingInterrupt>) -> Checkpoint {
        Checkpoint {
            id: "cp-1".to_string(),
            thread_id: "t1".to_string(),
            run_id: "run-1".to_string(),
            step_index: 2,
            schema_version: "hsw.v1".to_string(),
            graph_version: "g1".to_string(),
            checkpoint_format_version: CheckpointFormatVersion::CURRENT,
            store_payloads: BTreeMap::new(),
            frontier: vec![],
            pending_interrupt: pending,
        }
    }

    #[test]
    fn fails_when_no_interrupt_is_pending() {
        let cp = checkpoint(None);
        let err = validate_resume(&cp, "hsw.v1", "g1", "int-1");
        assert!(matches!(err, Err(RuntimeError::NoInterruptToResume)));
    }

    #[test]
    fn fails_on_interrupt_id_mismatch() {
        let cp = checkpoint(Some(PendingInterrupt {
            id: "int-1".to_string(),
            payload: json!({}),
            interrupted_nodes: vec!["tools".to_string()],
        }));
        let err = validate_resume(&cp, "hsw.v1", "g1", "int-2");
        assert!(matches!(err, Err(RuntimeError::ResumeInterruptMismatch { .. })));
    }

    #[test]
    fn succeeds_on_matching_interrupt() {
        let cp = checkpoint(Some(PendingInterrupt {
            id: "int-1".to_string(),
            payload: json!({"calls": []}),
            interrupted_nodes: vec!["tools".to_string()],
        }));
        let pending = validate_resume(&cp, "hsw.v1", "g1", "int-1").unwrap();
        assert_eq!(pending.id, "int-1");
    }
}
