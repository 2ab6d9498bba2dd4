//! Message and tool-call types shared by the `messages` channel, the
//! `MessagesReducer` (`spec.md` §4.1), and the agent loop nodes (§4.7).

use serde::{Deserialize, Serialize};

/// A message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The transient merge operation a [`MessageUpdate`] entry requests.
/// Stripped from every retained message once the reducer has merged it
/// (`spec.md` §4.1 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageOp {
    /// Upsert by id: replace if present, else append.
    Upsert,
    /// Delete by id; fails the batch if the id is unknown.
    Remove,
    /// Reset the channel to `[]` before applying any later entries in
    /// the same batch. `id` must be the removeAll sentinel
    /// (`Message::REMOVE_ALL_SENTINEL`).
    RemoveAll,
}

/// One conversational message. The `op` field is transient: present on
/// writes fed to the reducer, always `None` on values read back out of
/// the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<MessageOp>,
}

impl Message {
    /// The sentinel id a `removeAll` entry must carry.
    pub const REMOVE_ALL_SENTINEL: &'static str = "__remove_all__";

    /// A plain message with no tool calls and no pending op, as
    /// produced by readers of the `messages` channel.
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            op: None,
        }
    }

    /// A `removeAll` update entry.
    pub fn remove_all() -> Self {
        Self {
            id: Self::REMOVE_ALL_SENTINEL.to_string(),
            role: Role::System,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            op: Some(MessageOp::RemoveAll),
        }
    }

    /// A `remove` update entry targeting `id`.
    pub fn remove(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::System,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            op: Some(MessageOp::Remove),
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_tool_call_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }
}
