//! The `PromptBuilder` collaborator: owns system-prompt templating,
//! runbook/alert formatting, and custom-instruction injection. Controllers
//! only ever call the three methods below.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::config::IterationStrategy;
use crate::error::Result;
use crate::message::ConversationMessage;

#[async_trait]
pub trait PromptBuilder: Send + Sync {
    /// Builds the initial message list for a ReAct run: system prompt
    /// (including tool descriptions, since ReAct tools are text-described
    /// rather than bound) plus the user turn carrying the alert/runbook.
    async fn build_react_messages(
        &self,
        ctx: &ExecutionContext,
        prev_stage_context: Option<&str>,
    ) -> Result<Vec<ConversationMessage>>;

    /// Builds the initial message list for a native-thinking run. Tool
    /// descriptions are bound separately (see `ToolExecutor::list_tools`);
    /// the system prompt here does not need to enumerate them.
    async fn build_native_thinking_messages(
        &self,
        ctx: &ExecutionContext,
        prev_stage_context: Option<&str>,
    ) -> Result<Vec<ConversationMessage>>;

    /// Builds the single-shot message list used by the synthesis
    /// strategies.
    async fn build_synthesis_messages(
        &self,
        ctx: &ExecutionContext,
        prev_stage_context: Option<&str>,
    ) -> Result<Vec<ConversationMessage>>;

    /// The user-turn text appended when the iteration budget is
    /// exhausted. Default implementation delegates to
    /// [`crate::observation::build_forced_conclusion_prompt`], which is
    /// strategy-agnostic; override only if a deployment needs bespoke
    /// wording.
    fn forced_conclusion_prompt(&self, iteration: u32, strategy: IterationStrategy) -> String {
        crate::observation::build_forced_conclusion_prompt(iteration, strategy)
    }
}
