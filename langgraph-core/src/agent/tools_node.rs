//! The `tools` router node: approval-gating and the interrupt path
//! (`spec.md` §4.7, §4.4).

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::{CH_MESSAGES, CH_PENDING_TOOL_CALLS};
use crate::error::{Result, RuntimeError};
use crate::ids::{assistant_message_id, task_id};
use crate::messages::{Message, Role, ToolCall};
use crate::node::{InterruptRequest, Node, NodeInput, NodeOutput, NextDirective};
use crate::store::WriteBatch;

/// Whether a tool call batch requires human approval before execution.
#[derive(Debug, Clone)]
pub enum ApprovalPolicy {
    /// Never requires approval.
    Never,
    /// Every batch requires approval.
    Always,
    /// Approval is required for any call whose name is outside the set.
    AllowList(BTreeSet<String>),
}

impl ApprovalPolicy {
    fn requires_approval(&self, calls: &[ToolCall]) -> bool {
        match self {
            ApprovalPolicy::Never => false,
            ApprovalPolicy::Always => !calls.is_empty(),
            ApprovalPolicy::AllowList(allowed) => calls.iter().any(|c| !allowed.contains(&c.name)),
        }
    }
}

/// A reviewer's decision on an interrupted tool batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Cancelled,
}

/// The shape of the payload `resume` carries for a tool-approval interrupt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeDecision {
    pub decision: ApprovalDecision,
}

/// The `tools` node.
pub struct ToolsNode {
    pub policy: ApprovalPolicy,
}

#[async_trait]
impl Node for ToolsNode {
    async fn invoke(&self, input: NodeInput) -> Result<NodeOutput> {
        let mut calls: Vec<ToolCall> = input.store.get_typed(CH_PENDING_TOOL_CALLS).await?;
        calls.sort_by(|a, b| (a.name.as_str(), a.id.as_str()).cmp(&(b.name.as_str(), b.id.as_str())));

        if calls.is_empty() {
            return Ok(NodeOutput::commit(WriteBatch::new(), NextDirective::End));
        }

        if self.policy.requires_approval(&calls) {
            if input.resume.is_none() {
                return Ok(NodeOutput::interrupt(InterruptRequest::new(
                    "toolApprovalRequired",
                    json!({ "calls": calls }),
                )));
            }

            let resume_payload = input.resume.clone().expect("checked above");
            let decision: ResumeDecision = serde_json::from_value(resume_payload)
                .map_err(|e| RuntimeError::InvalidRunOptions(format!("malformed resume payload: {e}")))?;

            if decision.decision != ApprovalDecision::Approved {
                let reason = match decision.decision {
                    ApprovalDecision::Rejected => "rejected",
                    ApprovalDecision::Cancelled => "cancelled",
                    ApprovalDecision::Approved => unreachable!("checked above"),
                };
                let task_id = task_id(&input.run_id, input.step_index, &input.node_id, input.task_ordinal);
                let system_message = Message::new(
                    assistant_message_id(&task_id, "system"),
                    Role::System,
                    format!("tool calls {reason} by reviewer"),
                );
                let mut writes = WriteBatch::new();
                writes.push(CH_MESSAGES, serde_json::to_value(system_message)?);
                writes.push(CH_PENDING_TOOL_CALLS, serde_json::to_value(Vec::<ToolCall>::new())?);
                return Ok(NodeOutput::commit(writes, NextDirective::End));
            }
        }

        Ok(NodeOutput::commit(WriteBatch::new(), NextDirective::UseGraphEdges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_policy_never_requires_approval() {
        let calls = vec![ToolCall {
            id: "c1".to_string(),
            name: "calc".to_string(),
            arguments: json!({}),
        }];
        assert!(!ApprovalPolicy::Never.requires_approval(&calls));
    }

    #[test]
    fn allow_list_requires_approval_outside_set() {
        let mut allowed = BTreeSet::new();
        allowed.insert("calc".to_string());
        let policy = ApprovalPolicy::AllowList(allowed);
        let inside = vec![ToolCall {
            id: "c1".to_string(),
            name: "calc".to_string(),
            arguments: json!({}),
        }];
        let outside = vec![ToolCall {
            id: "c2".to_string(),
            name: "shell".to_string(),
            arguments: json!({}),
        }];
        assert!(!policy.requires_approval(&inside));
        assert!(policy.requires_approval(&outside));
    }
}
