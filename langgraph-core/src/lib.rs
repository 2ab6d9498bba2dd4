//! # langgraph-core
//!
//! A deterministic graph runtime for agent workflows: typed channels
//! with reducers, a compiled graph with a content-derived version hash,
//! a step scheduler with deferred nodes and node-level caching,
//! interrupt/resume against a checkpoint store, and a deterministic
//! event bus.
//!
//! ## Module organization
//!
//! ### Graph model
//! - [`channel`] - channel specs, scope/policy/persistence, reducers
//! - [`schema`] - the finite channel set a graph operates over
//! - [`store`] - the mutable store reducers write into
//! - [`graph`] - [`graph::GraphBuilder`] / [`graph::CompiledGraph`], routers
//! - [`node`] - the node handler contract
//!
//! ### Execution
//! - [`scheduler`] - the step scheduler: frontier, deferred carryover, caching
//! - [`cache`] - node-level result caching
//! - [`run`] - [`run::Runtime`], `start`/`resume`, checkpoint policy
//! - [`interrupt`] - resume-side validation against a checkpoint
//! - [`state`] - the state snapshot API
//! - [`event`] - the deterministic event bus
//! - [`hash`] - canonical transcript/state projection and hashing
//! - [`ids`] - deterministic id schemes
//!
//! ### Agent loop
//! - [`agent`] - the standard five-node model/tools loop
//! - [`messages`] - message types shared by the loop and its channels
//! - [`model`] - the abstract model client contract
//! - [`tool`] - the abstract tool registry contract
//! - [`tokenizer`] - the abstract tokenizer contract
//! - [`clock`] - the abstract clock, for deterministic tests
//!
//! ### External interfaces
//! - [`external`] - the collaborator traits, re-exported in one place,
//!   plus `applyExternalWrites`'s interrupt-pending admission check
//!
//! ### Errors
//! - [`error`] - the runtime's closed error union

pub mod agent;
pub mod cache;
pub mod channel;
pub mod clock;
pub mod error;
pub mod event;
pub mod external;
pub mod graph;
pub mod hash;
pub mod ids;
pub mod interrupt;
pub mod messages;
pub mod model;
pub mod node;
pub mod run;
pub mod scheduler;
pub mod schema;
pub mod state;
pub mod store;
pub mod tokenizer;
pub mod tool;

pub use error::{Result, RuntimeError};
pub use event::{Event, EventBus, EventEmitter, EventKind};
pub use external::apply_external_writes;
pub use graph::{CompiledGraph, GraphBuilder, Router, RouterDecision};
pub use node::{InterruptRequest, NextDirective, Node, NodeInput, NodeOutput};
pub use run::{CheckpointPolicy, OutputProjection, RunHandle, RunOptions, RunOutcome, Runtime};
pub use schema::{Schema, SchemaBuilder};
pub use scheduler::{FrontierMember, Scheduler, StepOutcome};
pub use state::{get_state, StateSnapshot, StateSource, StateTracker};
pub use store::{Store, Write, WriteBatch};
