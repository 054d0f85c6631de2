//! The shared controller contract and the factory that resolves an
//! [`IterationStrategy`] to a concrete controller.
//!
//! Four strategies, one trait: dispatch is a tagged-variant match at
//! construction time, not inheritance. Everything the controllers share —
//! observation formatting, the audit sink, the summarizer, the tool-call
//! executor — lives as free functions elsewhere in the crate, taking the
//! execution context explicitly rather than as methods on a base type.

pub mod forced_conclusion;
pub mod native_thinking;
pub mod react;
pub mod state;
pub mod synthesis;

use async_trait::async_trait;

use crate::config::IterationStrategy;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::stream::TokenUsage;

/// Whether a run produced a usable analysis or gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    #[default]
    Completed,
    Failed,
}

/// What a controller run produced: a final analysis, or the error that
/// ended it, plus the tokens spent getting there.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub final_analysis: Option<String>,
    pub error: Option<String>,
    pub tokens_used: TokenUsage,
}

impl ExecutionResult {
    pub fn completed(final_analysis: impl Into<String>, tokens_used: TokenUsage) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            final_analysis: Some(final_analysis.into()),
            error: None,
            tokens_used,
        }
    }

    pub fn failed(error: impl Into<String>, tokens_used: TokenUsage) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            final_analysis: None,
            error: Some(error.into()),
            tokens_used,
        }
    }
}

/// The one contract all four iteration strategies implement.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn run(&self, ctx: &ExecutionContext, prev_stage_context: Option<&str>) -> Result<ExecutionResult>;
}

/// Resolves a strategy to its concrete controller. Synthesis and
/// synthesis-native-thinking share one controller: they differ only in
/// which provider backend `ctx.config.backend_id` resolves to on the
/// `LlmClient` side, never in the sequence this crate runs.
pub fn build_controller(strategy: IterationStrategy) -> Box<dyn Controller> {
    match strategy {
        IterationStrategy::React => Box::new(react::ReActController),
        IterationStrategy::NativeThinking => Box::new(native_thinking::NativeThinkingController),
        IterationStrategy::Synthesis | IterationStrategy::SynthesisNativeThinking => {
            Box::new(synthesis::SynthesisController)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_resolves_every_strategy() {
        let _ = build_controller(IterationStrategy::React);
        let _ = build_controller(IterationStrategy::NativeThinking);
        let _ = build_controller(IterationStrategy::Synthesis);
        let _ = build_controller(IterationStrategy::SynthesisNativeThinking);
    }
}
