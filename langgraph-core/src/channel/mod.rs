//! The channel data model: type-erased descriptors wrapping a
//! [`Reducer`], per `spec.md`'s "polymorphic channels without
//! inheritance" design note (§9). A channel's value is held in the
//! store as an opaque `serde_json::Value` blob and round-trips through
//! typed accessors on read/write.

pub mod reducer;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use reducer::{LastWriteWins, MessagesReducer, Reducer, Sum};

/// Where a channel is visible from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Visible to all nodes and to external writers.
    Global,
    /// Visible only within one node invocation.
    TaskLocal,
}

/// How many writers a channel accepts per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// At most one writer per step; more than one write fails the batch.
    Single,
    /// Many writers, merged by the reducer.
    Multi,
}

/// Whether a channel's value survives across runs, resets every step,
/// or never leaves memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Included in checkpoint `store-payloads`; survives across runs.
    Checkpointed,
    /// Reset to its initial value after every step commit.
    Ephemeral,
    /// Lives in memory only, never serialized or checkpointed.
    Untracked,
}

/// The type-erased channel descriptor the store actually holds.
pub struct ChannelSpec {
    pub id: String,
    pub scope: Scope,
    pub policy: UpdatePolicy,
    pub persistence: Persistence,
    /// Name of the declared value type, used in `channel-type-mismatch`
    /// diagnostics. Not used for dispatch; the codec is just JSON.
    pub value_type: String,
    pub reducer: Arc<dyn Reducer>,
    initial: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl ChannelSpec {
    /// Builds a descriptor for a scalar/record channel reduced with
    /// [`LastWriteWins`].
    pub fn last_write_wins<T, F>(
        id: impl Into<String>,
        scope: Scope,
        policy: UpdatePolicy,
        persistence: Persistence,
        value_type: impl Into<String>,
        initial: F,
    ) -> Self
    where
        T: Serialize,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            scope,
            policy,
            persistence,
            value_type: value_type.into(),
            reducer: Arc::new(LastWriteWins),
            initial: Arc::new(move || serde_json::to_value(initial()).expect("initial value encodes")),
        }
    }

    /// Builds a descriptor for a numeric channel reduced with [`Sum`].
    pub fn sum(
        id: impl Into<String>,
        scope: Scope,
        persistence: Persistence,
        initial: f64,
    ) -> Self {
        Self {
            id: id.into(),
            scope,
            policy: UpdatePolicy::Multi,
            persistence,
            value_type: "number".to_string(),
            reducer: Arc::new(Sum),
            initial: Arc::new(move || Value::from(initial)),
        }
    }

    /// Builds the `messages` channel descriptor.
    pub fn messages(id: impl Into<String>, persistence: Persistence) -> Self {
        Self {
            id: id.into(),
            scope: Scope::Global,
            policy: UpdatePolicy::Multi,
            persistence,
            value_type: "messages".to_string(),
            reducer: Arc::new(MessagesReducer),
            initial: Arc::new(|| Value::Array(Vec::new())),
        }
    }

    /// Evaluates the initial-value factory.
    pub fn initial_value(&self) -> Value {
        (self.initial)()
    }
}

/// Decodes a channel value into `T`, for typed accessors built over
/// the store's opaque blobs.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value.clone())
}

/// Encodes `value` as the channel's stored representation.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}
