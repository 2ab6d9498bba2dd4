//! The error type surfaced when assembling a [`crate::standard_agent`]
//! graph.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrebuiltError>;

/// Errors raised while building the standard agent graph, distinct from
/// `langgraph_core::RuntimeError`, which covers errors raised while
/// *running* a compiled graph.
#[derive(Error, Debug)]
pub enum PrebuiltError {
    /// The graph failed compile-time validation (`langgraph_core::graph::GraphBuilder::build`).
    #[error("agent graph assembly failed: {0}")]
    GraphAssembly(#[from] langgraph_core::RuntimeError),
}
