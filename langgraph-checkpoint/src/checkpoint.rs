//! The checkpoint data model: a durable snapshot of a run's store,
//! frontier, and pending interruption (`spec.md` §3 "Checkpoint", §6
//! "Persisted format").

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Checkpoint wire format version. `HCP1` is the legacy format kept for
/// backward-compatible loads; `HCP2` is current and is the only format
/// new checkpoints are written under. Any other value round-trips as
/// `Unknown`, so an unrecognized version fails validation with the
/// named `checkpoint-corrupt` error (`spec.md` §"Persisted format")
/// rather than at deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointFormatVersion {
    /// Legacy format, load-only.
    Hcp1,
    /// Current format.
    Hcp2,
    /// Any version string this runtime doesn't recognize.
    Unknown(String),
}

impl CheckpointFormatVersion {
    /// The format version new checkpoints are written under.
    pub const CURRENT: Self = Self::Hcp2;
}

impl Serialize for CheckpointFormatVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = match self {
            Self::Hcp1 => "HCP1",
            Self::Hcp2 => "HCP2",
            Self::Unknown(raw) => raw.as_str(),
        };
        serializer.serialize_str(raw)
    }
}

impl<'de> Deserialize<'de> for CheckpointFormatVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "HCP1" => Self::Hcp1,
            "HCP2" => Self::Hcp2,
            _ => Self::Unknown(raw),
        })
    }
}

/// One entry of the frontier captured in a checkpoint: a node scheduled
/// to run next, why it was scheduled, and the fingerprint of the inputs
/// it will read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// The node scheduled to run.
    pub node_id: String,
    /// Which upstream node (or `"__start__"`) caused this node to be scheduled.
    pub provenance: String,
    /// Hash of the channel values this node will read, computed at
    /// scheduling time (`spec.md` §4.3 "Frontier").
    pub local_fingerprint: String,
}

/// The pending interruption recorded in a checkpoint, if the run was
/// suspended awaiting `resume` (`spec.md` §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Identifier of the interrupt, matched against `resume`'s `interrupt_id`.
    pub id: String,
    /// Opaque payload the interrupting node attached to the request.
    pub payload: serde_json::Value,
    /// Nodes that should receive the resume payload when this
    /// interrupt is resumed.
    pub interrupted_nodes: Vec<String>,
}

/// A durable snapshot of one run's store, frontier, and pending
/// interruption, keyed by thread and step (`spec.md` §3 "Checkpoint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Monotonically assigned per `(thread, step)`.
    pub id: String,
    /// The thread this checkpoint belongs to.
    pub thread_id: String,
    /// The run that produced this checkpoint.
    pub run_id: String,
    /// Scheduler step index this checkpoint was captured after.
    pub step_index: u64,
    /// Event schema version in effect when this checkpoint was written
    /// (e.g. `"hsw.v1"`).
    pub schema_version: String,
    /// Hash of the compiled graph structure (`spec.md` §4.2).
    pub graph_version: String,
    /// Wire format this checkpoint is encoded under.
    pub checkpoint_format_version: CheckpointFormatVersion,
    /// Encoded values for every `checkpointed`-tier channel, keyed by
    /// channel id, canonical-JSON encoded.
    pub store_payloads: BTreeMap<String, serde_json::Value>,
    /// The frontier at the time this checkpoint was taken.
    pub frontier: Vec<FrontierEntry>,
    /// The pending interruption, if any.
    pub pending_interrupt: Option<PendingInterrupt>,
}

impl Checkpoint {
    /// Validate this checkpoint against the caller's expected schema and
    /// graph versions, per the resume protocol in `spec.md` §4.4 step 2.
    pub fn validate_for_resume(
        &self,
        expected_schema_version: &str,
        expected_graph_version: &str,
    ) -> Result<(), crate::error::CheckpointError> {
        match &self.checkpoint_format_version {
            CheckpointFormatVersion::Hcp1 | CheckpointFormatVersion::Hcp2 => {}
            CheckpointFormatVersion::Unknown(_) => {
                return Err(crate::error::CheckpointError::Corrupt {
                    field: "checkpointFormatVersion".to_string(),
                    reason: "unsupported".to_string(),
                });
            }
        }
        if self.schema_version != expected_schema_version {
            return Err(crate::error::CheckpointError::Corrupt {
                field: "schemaVersion".to_string(),
                reason: format!(
                    "expected {expected_schema_version}, found {}",
                    self.schema_version
                ),
            });
        }
        if self.graph_version != expected_graph_version {
            return Err(crate::error::CheckpointError::Corrupt {
                field: "graphVersion".to_string(),
                reason: format!(
                    "expected {expected_graph_version}, found {}",
                    self.graph_version
                ),
            });
        }
        Ok(())
    }
}

/// Summary of a checkpoint returned by `listCheckpoints`, without the
/// full store payload (`spec.md` §6 "queryable" tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    /// The checkpoint's id.
    pub id: String,
    /// The thread it belongs to.
    pub thread_id: String,
    /// The step it was captured after.
    pub step_index: u64,
    /// Whether this checkpoint carries a pending interruption.
    pub has_pending_interrupt: bool,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            id: checkpoint.id.clone(),
            thread_id: checkpoint.thread_id.clone(),
            step_index: checkpoint.step_index,
            has_pending_interrupt: checkpoint.pending_interrupt.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint {
            id: "cp-1".to_string(),
            thread_id: "thread-1".to_string(),
            run_id: "run-1".to_string(),
            step_index: 3,
            schema_version: "hsw.v1".to_string(),
            graph_version: "graph-abc".to_string(),
            checkpoint_format_version: CheckpointFormatVersion::CURRENT,
            store_payloads: BTreeMap::new(),
            frontier: vec![],
            pending_interrupt: None,
        }
    }

    #[test]
    fn validates_matching_versions() {
        let checkpoint = sample();
        assert!(checkpoint.validate_for_resume("hsw.v1", "graph-abc").is_ok());
    }

    #[test]
    fn rejects_schema_mismatch() {
        let checkpoint = sample();
        let err = checkpoint
            .validate_for_resume("hsw.v2", "graph-abc")
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CheckpointError::Corrupt { field, .. } if field == "schemaVersion"
        ));
    }

    #[test]
    fn rejects_graph_version_mismatch() {
        let checkpoint = sample();
        let err = checkpoint
            .validate_for_resume("hsw.v1", "graph-other")
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CheckpointError::Corrupt { field, .. } if field == "graphVersion"
        ));
    }

    #[test]
    fn unknown_format_version_round_trips_and_is_rejected() {
        let value = serde_json::to_value(CheckpointFormatVersion::Unknown("HCP9".to_string())).unwrap();
        assert_eq!(value, serde_json::json!("HCP9"));
        let decoded: CheckpointFormatVersion = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, CheckpointFormatVersion::Unknown("HCP9".to_string()));

        let mut checkpoint = sample();
        checkpoint.checkpoint_format_version = decoded;
        let err = checkpoint.validate_for_resume("hsw.v1", "graph-abc").unwrap_err();
        assert!(matches!(
            err,
            crate::error::CheckpointError::Corrupt { field, reason }
                if field == "checkpointFormatVersion" && reason == "unsupported"
        ));
    }
}
