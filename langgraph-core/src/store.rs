//! The global store: `channel-id → current value`, governed by the
//! schema's reducers (`spec.md` §3, §4.1).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::channel::{decode, Persistence, Scope, UpdatePolicy};
use crate::error::{Result, RuntimeError};
use crate::schema::Schema;

/// One write targeting a channel.
#[derive(Debug, Clone)]
pub struct Write {
    pub channel: String,
    pub value: Value,
}

impl Write {
    pub fn new(channel: impl Into<String>, value: Value) -> Self {
        Self {
            channel: channel.into(),
            value,
        }
    }
}

/// A batch of writes to be applied atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch(pub Vec<Write>);

impl WriteBatch {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, channel: impl Into<String>, value: Value) {
        self.0.push(Write::new(channel, value));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn grouped(self) -> HashMap<String, Vec<Value>> {
        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for write in self.0 {
            grouped.entry(write.channel).or_default().push(write.value);
        }
        grouped
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The mutable state backing a [`Schema`]. Single-writer: all mutation
/// goes through [`Store::apply`]/[`Store::apply_external`], which the
/// scheduler serializes across steps. Concurrent node handlers within a
/// step only ever call [`Store::get`].
pub struct Store {
    schema: Arc<Schema>,
    values: RwLock<HashMap<String, Value>>,
}

impl Store {
    /// Builds a fresh store with every channel at its initial value.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .iter()
            .map(|(id, spec)| (id.to_string(), spec.initial_value()))
            .collect();
        Self {
            schema,
            values: RwLock::new(values),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Reads the raw, channel-opaque value.
    pub async fn get(&self, channel_id: &str) -> Result<Value> {
        self.schema.get(channel_id)?;
        let values = self.values.read().await;
        Ok(values.get(channel_id).cloned().unwrap_or(Value::Null))
    }

    /// Reads and decodes a channel's value as `T`.
    pub async fn get_typed<T: DeserializeOwned>(&self, channel_id: &str) -> Result<T> {
        let raw = self.get(channel_id).await?;
        decode(&raw).map_err(|e| RuntimeError::ChannelTypeMismatch {
            channel: channel_id.to_string(),
            expected: self.schema.get(channel_id).map(|s| s.value_type.clone()).unwrap_or_default(),
            actual: e.to_string(),
        })
    }

    /// Applies a batch of writes from node handlers within a step.
    /// Scope is not enforced here — the scheduler only ever forwards
    /// writes from the node(s) that own them.
    pub async fn apply(&self, batch: WriteBatch) -> Result<Vec<String>> {
        self.apply_checked(batch, false).await
    }

    /// Applies a batch of externally-submitted writes, enforcing the
    /// admission rules from `spec.md` §4.1: external writers may only
    /// target `global` channels.
    pub async fn apply_external(&self, batch: WriteBatch) -> Result<Vec<String>> {
        self.apply_checked(batch, true).await
    }

    async fn apply_checked(&self, batch: WriteBatch, enforce_external: bool) -> Result<Vec<String>> {
        let grouped = batch.grouped();
        let mut side_buffer = HashMap::new();

        for (channel_id, writes) in &grouped {
            let spec = self.schema.get(channel_id)?;

            if enforce_external && spec.scope == Scope::TaskLocal {
                return Err(RuntimeError::TaskLocalWriteNotAllowed(channel_id.clone()));
            }
            if spec.policy == UpdatePolicy::Single && writes.len() > 1 {
                return Err(RuntimeError::UpdatePolicyViolation(channel_id.clone()));
            }

            let current = self.get(channel_id).await?;
            // `messages` (and any future per-entry-reduced channel) holds
            // an array but is written one entry at a time, so its writes
            // never share the current value's JSON kind by design.
            if spec.value_type != "messages" {
                if let Some(first) = writes.first() {
                    let current_kind = json_kind(&current);
                    let write_kind = json_kind(first);
                    if current_kind != "null" && write_kind != current_kind {
                        return Err(RuntimeError::ChannelTypeMismatch {
                            channel: channel_id.clone(),
                            expected: current_kind.to_string(),
                            actual: write_kind.to_string(),
                        });
                    }
                }
            }

            let new_value = spec
                .reducer
                .apply(channel_id, current, writes.clone())
                .map_err(|e| match e {
                    RuntimeError::ReducerFailed { .. } | RuntimeError::InvalidMessagesUpdate(_) => e,
                    other => RuntimeError::ReducerFailed {
                        channel: channel_id.clone(),
                        cause: other.to_string(),
                    },
                })?;
            side_buffer.insert(channel_id.clone(), new_value);
        }

        let mut values = self.values.write().await;
        let mut touched: Vec<String> = side_buffer.keys().cloned().collect();
        touched.sort();
        for (channel_id, value) in side_buffer {
            values.insert(channel_id, value);
        }
        Ok(touched)
    }

    /// Resets every `ephemeral` channel to its initial value, as
    /// happens at every step commit.
    pub async fn reset_ephemeral(&self) {
        let mut values = self.values.write().await;
        for (id, spec) in self.schema.iter() {
            if spec.persistence == Persistence::Ephemeral {
                values.insert(id.to_string(), spec.initial_value());
            }
        }
    }

    /// Snapshots every `checkpointed` channel for `Checkpoint::store_payloads`.
    pub async fn checkpoint_payloads(&self) -> BTreeMap<String, Value> {
        let values = self.values.read().await;
        self.schema
            .iter()
            .filter(|(_, spec)| spec.persistence == Persistence::Checkpointed)
            .filter_map(|(id, _)| values.get(id).map(|v| (id.to_string(), v.clone())))
            .collect()
    }

    /// Rehydrates checkpointed channels from a loaded checkpoint.
    pub async fn load_payloads(&self, payloads: &BTreeMap<String, Value>) {
        let mut values = self.values.write().await;
        for (id, value) in payloads {
            values.insert(id.clone(), value.clone());
        }
    }

    /// A digest view of the store sorted by channel id, for
    /// [`crate::hash`] state-hash projection.
    pub async fn channel_entries(&self) -> Vec<(String, Value)> {
        let values = self.values.read().await;
        let mut entries: Vec<(String, Value)> = values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
