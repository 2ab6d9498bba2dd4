//! The runtime's closed error union (`spec.md` §7).
//!
//! Every fallible operation in the crate returns [`RuntimeError`] (or a
//! type alias over it). Node-local errors fail the node invocation and,
//! unless caught by a retry policy, the step; step failure ends the run
//! with a failed outcome carrying the first error. Pre-run and
//! validation errors never mutate the store.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// The closed tagged union of errors the runtime can raise, mirroring
/// the table in `spec.md` §7 one-for-one.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A read or write named a channel id the schema doesn't declare.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// A read or write's declared value type didn't match the
    /// channel's declared type.
    #[error("channel type mismatch on {channel}: expected {expected}, found {actual}")]
    ChannelTypeMismatch {
        /// The channel involved.
        channel: String,
        /// The type the channel's schema declares.
        expected: String,
        /// The type actually encountered.
        actual: String,
    },

    /// An external writer targeted a `task-local` channel.
    #[error("task-local channel {0} cannot be written by an external writer")]
    TaskLocalWriteNotAllowed(String),

    /// A `single`-policy channel received more than one write in a batch.
    #[error("channel {0} has update policy `single` but received more than one write")]
    UpdatePolicyViolation(String),

    /// A `MessagesReducer` batch was malformed (`spec.md` §4.1 step 1).
    #[error("invalid messages update: {0}")]
    InvalidMessagesUpdate(String),

    /// A reducer raised during `apply`; no channel was modified.
    #[error("reducer failed for channel {channel}: {cause}")]
    ReducerFailed {
        /// The channel whose reducer failed.
        channel: String,
        /// The underlying cause.
        cause: String,
    },

    /// The abstract model client's stream violated the streaming
    /// contract (more than one `final`, tokens after `final`, or no
    /// `final` at all).
    #[error("model stream invalid: {0}")]
    ModelStreamInvalid(String),

    /// A tool invocation failed (prior to any retry/circuit-breaker
    /// bookkeeping, which happens one layer up).
    #[error("tool {tool} failed: {cause}")]
    ToolFailed {
        /// The tool that failed.
        tool: String,
        /// The underlying cause.
        cause: String,
    },

    /// Preflight: no model client was supplied but the compiled graph
    /// contains a `model` node.
    #[error("model client missing")]
    ModelClientMissing,

    /// Preflight: no tool registry was supplied but the compiled graph
    /// contains a `toolExecute` node.
    #[error("tool registry missing")]
    ToolRegistryMissing,

    /// Preflight: a checkpoint policy other than `disabled` was
    /// configured but no checkpoint store was supplied.
    #[error("checkpoint store missing")]
    CheckpointStoreMissing,

    /// Preflight: the supplied `RunOptions` are self-inconsistent.
    #[error("invalid run options: {0}")]
    InvalidRunOptions(String),

    /// An external write was submitted while an interrupt is pending.
    #[error("interrupt pending: {0}")]
    InterruptPending(String),

    /// `resume` was called for a thread with no checkpoint.
    #[error("no checkpoint to resume")]
    NoCheckpointToResume,

    /// `resume` was called against a checkpoint with no pending
    /// interruption.
    #[error("no interrupt to resume")]
    NoInterruptToResume,

    /// `resume`'s interrupt id didn't match the checkpoint's recorded one.
    #[error("resume interrupt mismatch: expected {expected}, found {found}")]
    ResumeInterruptMismatch {
        /// Recorded interrupt id.
        expected: String,
        /// Supplied interrupt id.
        found: String,
    },

    /// A loaded checkpoint failed validation.
    #[error("checkpoint corrupt: {field} ({reason})")]
    CheckpointCorrupt {
        /// The field that failed validation.
        field: String,
        /// Human-readable reason.
        reason: String,
    },

    /// An event in a replayed stream carries no `eventSchemaVersion`.
    #[error("missing schema version at event {0}")]
    MissingSchemaVersion(u64),

    /// An event in a replayed stream carries an unexpected
    /// `eventSchemaVersion`.
    #[error("incompatible schema version at event {index}: expected {expected}, found {found}")]
    IncompatibleSchemaVersion {
        /// Expected schema version tag.
        expected: String,
        /// Version tag actually found.
        found: String,
        /// The event's index.
        index: u64,
    },

    /// A retry policy exhausted its attempts.
    #[error("retries exhausted after {attempts} attempts: {cause}")]
    RetriesExhausted {
        /// Number of attempts made, equal to the policy's `max_attempts`.
        attempts: u32,
        /// The last error observed.
        cause: String,
    },

    /// A `stepIndex` exceeded `u32::MAX` while deriving a deterministic
    /// message id (`spec.md` §4.7.1).
    #[error("invalid stepIndex: {0}")]
    InvalidStepIndex(u64),

    /// Tool registry construction found two tools sharing a name.
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),

    /// Graph compilation failed (`spec.md` §4.2).
    #[error("graph validation failed: {0}")]
    GraphValidation(String),

    /// Wraps the checkpoint crate's own error union.
    #[error(transparent)]
    Checkpoint(#[from] langgraph_checkpoint::CheckpointError),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// `true` for errors that represent a normal, expected control-flow
    /// outcome (interrupt admission) rather than a defect, matching how
    /// the scheduler distinguishes "surfaced to caller" from "ends the run".
    pub fn is_interrupt_pending(&self) -> bool {
        matches!(self, RuntimeError::InterruptPending(_))
    }
}
