//! The standard model/tools agent graph, assembled from
//! `langgraph-core` primitives.
//!
//! This crate ships one topology: `preModel` → `model` → `tools` →
//! `toolExecute` → `postModel`, looping back to `preModel` until the
//! model stops proposing tool calls. [`standard_agent::build`] wires
//! up the five nodes declared in `langgraph_core::agent` against a
//! caller-supplied model client and, optionally, a tool registry,
//! returning a [`langgraph_core::CompiledGraph`] ready to hand to
//! `langgraph_core::Runtime`.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use langgraph_prebuilt::standard_agent::{self, StandardAgentConfig};
//! use langgraph_core::Runtime;
//!
//! let config = StandardAgentConfig::new(model_client);
//! let agent = standard_agent::build(config)?;
//! let runtime = Runtime::new(agent.graph, agent.schema).with_model_client().with_tool_registry();
//! ```

pub mod error;
pub mod standard_agent;

pub use error::{PrebuiltError, Result};
pub use standard_agent::{StandardAgent, StandardAgentConfig};
