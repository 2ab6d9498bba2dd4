//! Deterministic projection: canonical transcripts, transcript/state
//! hashes, and first-diff reports (`spec.md` §4.6).

use langgraph_checkpoint::canonical::{canonical_bytes, canonical_hash};
use langgraph_checkpoint::FrontierEntry;
use serde_json::{json, Map, Value};

use crate::event::{Event, EventKind};

/// One entry of the canonical transcript projection. `-1` stands in
/// for an absent `step_index`/`task_ordinal`, matching `spec.md`'s
/// "treating absent fields as -1" ordering rule.
#[derive(Debug, Clone)]
pub struct TranscriptRecord {
    pub event_index: i64,
    pub step_index: i64,
    pub task_ordinal: i64,
    pub canonical_kind: String,
    pub attributes: Value,
    pub metadata: Value,
}

fn canonical_kind_and_attributes(kind: &EventKind) -> (&'static str, Value) {
    match kind {
        EventKind::RunStarted => ("runStarted", json!({})),
        EventKind::RunFinished => ("runFinished", json!({})),
        EventKind::RunInterrupted { interrupt_id } => ("runInterrupted", json!({ "interruptID": interrupt_id })),
        EventKind::RunResumed { interrupt_id } => ("runResumed", json!({ "interruptID": interrupt_id })),
        EventKind::RunCancelled => ("runCancelled", json!({})),
        EventKind::CancelledAfterCheckpointSaved { checkpoint_id } => {
            ("cancelledAfterCheckpointSaved", json!({ "checkpointID": checkpoint_id }))
        }
        EventKind::CancelledWithoutCheckpoint { latest_checkpoint_id } => (
            "cancelledWithoutCheckpoint",
            json!({ "latestCheckpointID": latest_checkpoint_id }),
        ),
        EventKind::StepStarted { step, frontier_count } => {
            ("stepStarted", json!({ "stepIndex": step, "frontierCount": frontier_count }))
        }
        EventKind::StepFinished { step, next_frontier_count } => (
            "stepFinished",
            json!({ "stepIndex": step, "nextFrontierCount": next_frontier_count }),
        ),
        EventKind::TaskFailed { node_id, error_description } => (
            "taskFailed",
            json!({ "nodeID": node_id, "errorDescription": error_description }),
        ),
        EventKind::WriteApplied { channel_id } => ("writeApplied", json!({ "channelID": channel_id })),
        EventKind::CheckpointSaved { id } => ("checkpointSaved", json!({ "id": id })),
        EventKind::CheckpointLoaded { id } => ("checkpointLoaded", json!({ "id": id })),
        EventKind::ModelInvocationStarted => ("modelInvocationStarted", json!({})),
        EventKind::ModelInvocationFinished => ("modelInvocationFinished", json!({})),
        EventKind::ModelToken { .. } => ("modelToken", json!({})),
        EventKind::ToolInvocationStarted { name, tool_call_id } => (
            "toolInvocationStarted",
            json!({ "name": name, "toolCallID": tool_call_id }),
        ),
        EventKind::ToolInvocationFinished { name, success, tool_call_id } => (
            "toolInvocationFinished",
            json!({ "name": name, "success": success, "toolCallID": tool_call_id }),
        ),
        EventKind::CacheHit { node_id } => ("cacheHit", json!({ "nodeID": node_id })),
        EventKind::CacheMiss { node_id } => ("cacheMiss", json!({ "nodeID": node_id })),
        EventKind::StreamBackpressure {
            dropped_model_tokens,
            dropped_debug_events,
        } => (
            "streamBackpressure",
            json!({ "droppedModelTokens": dropped_model_tokens, "droppedDebugEvents": dropped_debug_events }),
        ),
        EventKind::CustomDebug { tag, .. } => ("customDebug", json!({ "tag": tag })),
    }
}

/// Projects raw events into the canonical transcript, sorted by
/// `(event-index, step-index, task-ordinal)` ascending.
pub fn canonical_transcript(events: &[Event]) -> Vec<TranscriptRecord> {
    let mut records: Vec<TranscriptRecord> = events
        .iter()
        .map(|event| {
            let (kind, attributes) = canonical_kind_and_attributes(&event.kind);
            TranscriptRecord {
                event_index: event.event_index as i64,
                step_index: event.step_index.map(|s| s as i64).unwrap_or(-1),
                task_ordinal: event.task_ordinal.map(|t| t as i64).unwrap_or(-1),
                canonical_kind: kind.to_string(),
                attributes,
                metadata: Value::Object(event.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            }
        })
        .collect();
    records.sort_by_key(|r| (r.event_index, r.step_index, r.task_ordinal));
    records
}

fn canonical_string(value: &Value) -> String {
    String::from_utf8(canonical_bytes(value)).expect("canonical JSON bytes are valid UTF-8")
}

fn composite_sort_key(record: &TranscriptRecord) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        record.step_index,
        record.task_ordinal,
        record.canonical_kind,
        canonical_string(&record.attributes),
        canonical_string(&record.metadata),
    )
}

/// Hashes the transcript *excluding* `event-index`, sorted by the
/// stable composite key `"step|task|kind|attrs|metadata"`.
pub fn transcript_hash(events: &[Event]) -> String {
    let mut records = canonical_transcript(events);
    records.sort_by(|a, b| composite_sort_key(a).cmp(&composite_sort_key(b)));

    let projected: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "stepIndex": r.step_index,
                "taskOrdinal": r.task_ordinal,
                "kind": r.canonical_kind,
                "attributes": r.attributes,
                "metadata": r.metadata,
            })
        })
        .collect();

    canonical_hash(&Value::Array(projected))
}

/// Identity fields only included in a state hash when the caller
/// explicitly opts in (`spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct RuntimeIdentity {
    pub run_id: Option<String>,
    pub interrupt_id: Option<String>,
    pub checkpoint_id: Option<String>,
}

/// The inputs to a [`state_hash`] computation.
pub struct StateHashInput<'a> {
    pub thread_id: &'a str,
    pub step_index: u64,
    pub interruption_payload_hash: Option<String>,
    pub frontier: &'a [FrontierEntry],
    pub channel_entries: &'a [(String, Value)],
    pub event_schema_version: &'a str,
    pub source: &'a str,
    pub runtime_identity: Option<RuntimeIdentity>,
}

fn hash_value(value: &Value) -> String {
    canonical_hash(value)
}

/// Computes the deterministic state hash over the fields `spec.md`
/// §4.6 names.
pub fn state_hash(input: &StateHashInput<'_>) -> String {
    let mut frontier_entries: Vec<&FrontierEntry> = input.frontier.iter().collect();
    frontier_entries.sort_by(|a, b| {
        (a.node_id.as_str(), a.provenance.as_str(), a.local_fingerprint.as_str()).cmp(&(
            b.node_id.as_str(),
            b.provenance.as_str(),
            b.local_fingerprint.as_str(),
        ))
    });
    let frontier_projection: Vec<Value> = frontier_entries
        .iter()
        .map(|e| {
            json!({
                "nodeID": e.node_id,
                "provenance": e.provenance,
                "fingerprintHash": e.local_fingerprint,
            })
        })
        .collect();
    let frontier_hash = hash_value(&Value::Array(frontier_projection.clone()));

    let mut channel_entries = input.channel_entries.to_vec();
    channel_entries.sort_by(|a, b| a.0.cmp(&b.0));
    let channel_projection: Vec<Value> = channel_entries
        .iter()
        .map(|(id, value)| {
            json!({
                "channelID": id,
                "valueHash": hash_value(value),
            })
        })
        .collect();
    let channel_hash = hash_value(&Value::Array(channel_projection.clone()));

    let mut object = Map::new();
    object.insert("threadID".to_string(), Value::from(input.thread_id));
    object.insert("stepIndex".to_string(), Value::from(input.step_index));
    if let Some(payload_hash) = &input.interruption_payload_hash {
        object.insert("interruptionPayloadHash".to_string(), Value::from(payload_hash.clone()));
    }
    object.insert(
        "frontier".to_string(),
        json!({ "count": frontier_projection.len(), "hash": frontier_hash, "entries": frontier_projection }),
    );
    object.insert(
        "channelState".to_string(),
        json!({ "hash": channel_hash, "entries": channel_projection }),
    );
    object.insert("eventSchemaVersion".to_string(), Value::from(input.event_schema_version));
    object.insert("source".to_string(), Value::from(input.source));

    if let Some(identity) = &input.runtime_identity {
        if let Some(run_id) = &identity.run_id {
            object.insert("runID".to_string(), Value::from(run_id.clone()));
        }
        if let Some(interrupt_id) = &identity.interrupt_id {
            object.insert("interruptID".to_string(), Value::from(interrupt_id.clone()));
        }
        if let Some(checkpoint_id) = &identity.checkpoint_id {
            object.insert("checkpointID".to_string(), Value::from(checkpoint_id.clone()));
        }
    }

    hash_value(&Value::Object(object))
}

/// Given two canonicalizable JSON values, returns the first differing
/// path (dotted selector) with both sides' string rendering, or `None`
/// if they're equal under canonical encoding.
pub fn first_diff(left: &Value, right: &Value) -> Option<(String, String, String)> {
    first_diff_at("$", left, right)
}

fn render(value: &Value) -> String {
    canonical_string(value)
}

fn first_diff_at(path: &str, left: &Value, right: &Value) -> Option<(String, String, String)> {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let sub_path = format!("{path}.{key}");
                match (l.get(key), r.get(key)) {
                    (Some(lv), Some(rv)) => {
                        if let Some(diff) = first_diff_at(&sub_path, lv, rv) {
                            return Some(diff);
                        }
                    }
                    (Some(lv), None) => return Some((sub_path, render(lv), "<absent>".to_string())),
                    (None, Some(rv)) => return Some((sub_path, "<absent>".to_string(), render(rv))),
                    (None, None) => unreachable!("key came from one of the two maps"),
                }
            }
            None
        }
        (Value::Array(l), Value::Array(r)) => {
            for (index, (lv, rv)) in l.iter().zip(r.iter()).enumerate() {
                let sub_path = format!("{path}[{index}]");
                if let Some(diff) = first_diff_at(&sub_path, lv, rv) {
                    return Some(diff);
                }
            }
            if l.len() != r.len() {
                return Some((path.to_string(), render(left), render(right)));
            }
            None
        }
        _ => {
            if left != right {
                Some((path.to_string(), render(left), render(right)))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event(event_index: u64, step_index: Option<u64>, kind: EventKind) -> Event {
        let mut metadata = BTreeMap::new();
        metadata.insert("eventSchemaVersion".to_string(), Value::from("hsw.v1"));
        Event {
            event_index,
            step_index,
            task_ordinal: None,
            kind,
            metadata,
        }
    }

    #[test]
    fn transcript_hash_is_stable_under_event_index_reordering() {
        let events_a = vec![
            event(0, Some(0), EventKind::StepStarted { step: 0, frontier_count: 1 }),
            event(1, Some(0), EventKind::StepFinished { step: 0, next_frontier_count: 0 }),
        ];
        let events_b = vec![
            event(5, Some(0), EventKind::StepStarted { step: 0, frontier_count: 1 }),
            event(9, Some(0), EventKind::StepFinished { step: 0, next_frontier_count: 0 }),
        ];
        assert_eq!(transcript_hash(&events_a), transcript_hash(&events_b));
    }

    #[test]
    fn transcript_hash_changes_with_content() {
        let a = vec![event(0, Some(0), EventKind::StepStarted { step: 0, frontier_count: 1 })];
        let b = vec![event(0, Some(0), EventKind::StepStarted { step: 0, frontier_count: 2 })];
        assert_ne!(transcript_hash(&a), transcript_hash(&b));
    }

    #[test]
    fn first_diff_finds_nested_path() {
        let left = json!({ "a": { "b": 1 } });
        let right = json!({ "a": { "b": 2 } });
        let (path, lv, rv) = first_diff(&left, &right).unwrap();
        assert_eq!(path, "$.a.b");
        assert_eq!(lv, "1");
        assert_eq!(rv, "2");
    }

    #[test]
    fn first_diff_is_none_for_key_reordered_equal_objects() {
        let left = json!({ "a": 1, "b": 2 });
        let right = json!({ "b": 2, "a": 1 });
        assert!(first_diff(&left, &right).is_none());
    }

    #[test]
    fn state_hash_sorts_frontier_and_channel_entries() {
        let frontier = vec![
            FrontierEntry {
                node_id: "b".to_string(),
                provenance: "x".to_string(),
                local_fingerprint: "f1".to_string(),
            },
            FrontierEntry {
                node_id: "a".to_string(),
                provenance: "x".to_string(),
                local_fingerprint: "f2".to_string(),
            },
        ];
        let channels_a = vec![("z".to_string(), Value::from(1)), ("a".to_string(), Value::from(2))];
        let channels_b = vec![("a".to_string(), Value::from(2)), ("z".to_string(), Value::from(1))];
        let make = |channels: &[(String, Value)]| {
            state_hash(&StateHashInput {
                thread_id: "t1",
                step_index: 3,
                interruption_payload_hash: None,
                frontier: &frontier,
                channel_entries: channels,
                event_schema_version: "hsw.v1",
                source: "memory",
                runtime_identity: None,
            })
        };
        assert_eq!(make(&channels_a), make(&channels_b));
    }
}
