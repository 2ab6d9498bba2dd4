//! Error types for checkpoint persistence and retrieval.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors raised by [`crate::traits::CheckpointStore`] implementations and
/// by checkpoint encode/decode.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the thread being resumed.
    #[error("no checkpoint to resume thread {0}")]
    NoCheckpointToResume(String),

    /// The checkpoint loaded for resume carries no pending interruption.
    #[error("no interrupt to resume for thread {0}")]
    NoInterruptToResume(String),

    /// `resume` was called with an interrupt id that does not match the
    /// checkpoint's recorded interruption.
    #[error("resume interrupt mismatch: expected {expected}, found {found}")]
    ResumeInterruptMismatch {
        /// Interrupt id recorded in the checkpoint.
        expected: String,
        /// Interrupt id supplied by the caller.
        found: String,
    },

    /// A checkpoint failed validation: unknown format version, schema
    /// mismatch, graph version mismatch, or corrupt payload.
    #[error("checkpoint corrupt: {field} ({reason})")]
    Corrupt {
        /// The field that failed validation (e.g. `"checkpointFormatVersion"`).
        field: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The store tier does not support the requested operation
    /// (e.g. `listCheckpoints` against a `latestOnly` store).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// No checkpoint store is configured at all.
    #[error("checkpoint store unavailable")]
    Unavailable,

    /// JSON encode/decode failure.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
