//! Configuration *data shapes* consumed by a controller run.
//!
//! This module deliberately stops at data: there is no file or environment
//! loader here (see `DESIGN.md` for why) — assembling a `ResolvedConfig`
//! from whatever source an embedding application prefers is its job, not
//! this crate's. The shapes follow the same `serde(default = "fn")` idiom
//! used throughout the rest of this codebase's config types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Which iteration controller a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IterationStrategy {
    React,
    NativeThinking,
    Synthesis,
    SynthesisNativeThinking,
}

impl IterationStrategy {
    /// Parses the strategy names used in resolved configuration. An empty
    /// string is a configuration error, not a default.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "react" => Ok(Self::React),
            "native-thinking" => Ok(Self::NativeThinking),
            "synthesis" => Ok(Self::Synthesis),
            "synthesis-native-thinking" => Ok(Self::SynthesisNativeThinking),
            "" => Err(Error::Config("iteration strategy must not be empty".into())),
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }

    /// True for strategies that bind tools to the request and receive
    /// structured tool-call chunks, rather than parsing tool calls out of
    /// free-form text.
    pub fn is_native_tool_calling(&self) -> bool {
        matches!(self, Self::NativeThinking)
    }

    /// True for single-shot strategies with no iteration loop.
    pub fn is_single_shot(&self) -> bool {
        matches!(self, Self::Synthesis | Self::SynthesisNativeThinking)
    }
}

fn default_max_iterations() -> u32 {
    10
}

fn default_iteration_timeout_secs() -> u64 {
    120
}

/// Configuration resolved for a single controller run, carried on the
/// `ExecutionContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Iteration budget before forced conclusion kicks in. Ignored by
    /// single-shot strategies.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Per-iteration LLM-call deadline, in seconds (serde-friendly; use
    /// `iteration_timeout()` for a `Duration`).
    #[serde(default = "default_iteration_timeout_secs")]
    pub iteration_timeout_secs: u64,
    /// Provider-facing model/provider identifier, opaque to this crate.
    pub provider_spec: String,
    /// Which configured LLM backend the client should resolve against.
    /// Distinguishes `synthesis` from `synthesis-native-thinking` even
    /// though both run the identical `SynthesisController` sequence.
    pub backend_id: String,
    /// Freeform additional instructions appended to the system prompt by
    /// the `PromptBuilder` collaborator; this crate only threads it through.
    #[serde(default)]
    pub custom_instructions: Option<String>,
    pub strategy: IterationStrategy,
    /// Per tool-backend-server summarization settings.
    #[serde(default)]
    pub summarization: HashMap<String, SummarizationConfig>,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl ResolvedConfig {
    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_secs(self.iteration_timeout_secs)
    }

    pub fn summarization_for(&self, server_name: &str) -> Option<&SummarizationConfig> {
        self.summarization.get(server_name)
    }
}

fn default_size_threshold_tokens() -> u32 {
    2_000
}

fn default_summary_max_tokens() -> u32 {
    500
}

/// Summarization policy for tool results returned by one tool backend
/// server. Keyed by server name in `ResolvedConfig::summarization`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_size_threshold_tokens")]
    pub size_threshold_tokens: u32,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
}

impl SummarizationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            size_threshold_tokens: default_size_threshold_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Default cap on how many tokens a stored message or event body keeps
/// before truncation; configurable per deployment.
pub const DEFAULT_STORAGE_TRUNCATION_CAP_TOKENS: u32 = 8_000;

fn default_storage_truncation_cap_tokens() -> u32 {
    DEFAULT_STORAGE_TRUNCATION_CAP_TOKENS
}

/// Settings for the audit sink's own storage behaviour (independent of
/// summarization, which shortens content *before* it reaches the sink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_storage_truncation_cap_tokens")]
    pub storage_truncation_cap_tokens: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            storage_truncation_cap_tokens: DEFAULT_STORAGE_TRUNCATION_CAP_TOKENS,
        }
    }
}
