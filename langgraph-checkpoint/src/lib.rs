//! # langgraph-checkpoint — durable checkpoints for the hearthswarm runtime
//!
//! A [`Checkpoint`] is an immutable, point-in-time snapshot of one run's
//! store, frontier, and pending interruption (`spec.md` §3). This crate
//! owns the checkpoint data model, its canonical encoding, and the
//! [`CheckpointStore`] trait consumed by `langgraph-core`'s scheduler
//! and interrupt/resume state machine.
//!
//! A checkpoint store is an **external collaborator** (`spec.md` §6):
//! the runtime core only ever talks to the [`CheckpointStore`] trait,
//! discovering which capability tier an implementation provides by
//! probing it ([`probe_capability`]) rather than assuming one from the
//! store's type. [`InMemoryCheckpointStore`] is the one concrete
//! implementation shipped here, for tests and single-process use; a
//! production deployment supplies its own (Postgres, SQLite, object
//! storage) against the same trait.

pub mod canonical;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointFormatVersion, CheckpointSummary, FrontierEntry, PendingInterrupt,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use traits::{probe_capability, CheckpointCapability, CheckpointStore, CAPABILITY_PROBE_THREAD};
