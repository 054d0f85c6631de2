//! # rca-agent
//!
//! A family of **iteration controllers** that drive an LLM-based
//! investigation agent to a final analysis: ReAct (text tool calling),
//! native-thinking (structured tool calling), synthesis, and
//! synthesis-native-thinking (single-shot, no tool loop).
//!
//! A controller owns the bounded reasoning loop — prompting, streamed
//! chunk collection, tool dispatch, fail-open summarization, a dual
//! audit trail, and a forced-conclusion fallback once the iteration
//! budget runs out. Everything around it (the LLM transport, the tool
//! executor transport, prompt templating, persistence's query layer
//! beyond the bundled reference adapter) is an external collaborator
//! threaded through [`context::ExecutionContext`].
//!
//! ## Layout
//!
//! - [`config`] — the data shapes a run is configured with
//! - [`message`], [`stream`], [`llm`] — the conversation and LLM-call types
//! - [`react_parser`], [`observation`] — ReAct's text protocol
//! - [`tools`] — tool-name normalization and dispatch
//! - [`summarizer`] — fail-open tool-output summarization
//! - [`audit`] — the dual audit trail (messages + timeline + interactions)
//! - [`controller`] — the four strategies and their shared contract
//! - [`persistence`] — the reference `sqlx`/Postgres service-bundle adapter

pub mod audit;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod llm;
pub mod message;
pub mod observation;
pub mod persistence;
pub mod prompt;
pub mod react_parser;
pub mod stream;
pub mod summarizer;
pub mod tools;

#[cfg(test)]
pub mod testutil;

pub use error::{Error, Result};

pub use config::{IterationStrategy, ResolvedConfig};
pub use context::ExecutionContext;
pub use controller::{build_controller, Controller, ExecutionResult, ExecutionStatus};

/// Crate version, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, from `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
