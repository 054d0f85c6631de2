//! The shared forced-conclusion sequence both loop-based controllers fall
//! back to once their iteration budget is exhausted.
//!
//! ReAct and native-thinking differ only in how they turn the raw model
//! text into a final analysis (the former re-parses it for a `Final
//! Answer:` marker, the latter takes it as-is), so this module does the
//! shared part — the healthy/failed fork, the prompt, the call, the
//! persistence — and hands the caller back raw text to finish with.

use std::time::Instant;

use crate::audit::{AuditSink, LlmInteractionType};
use crate::config::IterationStrategy;
use crate::context::ExecutionContext;
use crate::controller::state::IterationState;
use crate::controller::ExecutionResult;
use crate::error::Result;
use crate::llm::GenerateInput;
use crate::message::ConversationMessage;
use crate::stream::TokenUsage;

/// Outcome of attempting forced conclusion: either the run is already
/// doomed (last interaction failed) and returns a failed result directly,
/// or the forced-conclusion LLM call completed and the caller must still
/// turn `raw_text` into a final analysis and emit the `final_analysis`
/// event.
pub enum ForcedConclusionOutcome {
    Failed(ExecutionResult),
    Completed { raw_text: String },
}

/// Runs the forced-conclusion sequence on a healthy trailing state:
/// appends the forced-conclusion prompt, calls the LLM without tools, and
/// persists the assistant reply. On an unhealthy trailing state, returns a
/// failed result referencing the last error and "max iterations" without
/// making any further LLM call.
pub async fn attempt(
    ctx: &ExecutionContext,
    sink: &AuditSink,
    state: &IterationState,
    strategy: IterationStrategy,
    messages: &mut Vec<ConversationMessage>,
    total_usage: &mut TokenUsage,
) -> Result<ForcedConclusionOutcome> {
    if state.last_interaction_failed {
        let last_error = state.last_error_message.clone().unwrap_or_else(|| "unknown error".to_string());
        return Ok(ForcedConclusionOutcome::Failed(ExecutionResult::failed(
            format!("max iterations ({}) reached after a failed interaction: {last_error}", state.max_iterations),
            total_usage.clone(),
        )));
    }

    let prompt = ctx.prompt_builder.forced_conclusion_prompt(state.current_iteration, strategy);
    let prompt_message = ConversationMessage::user(prompt);
    sink.store_messages(std::slice::from_ref(&prompt_message)).await?;
    messages.push(prompt_message);

    let started_at = Instant::now();
    let input = GenerateInput {
        session_id: ctx.session_id.clone(),
        execution_id: ctx.execution_id.clone(),
        messages: messages.clone(),
        provider_spec: ctx.config.provider_spec.clone(),
        backend_id: ctx.config.backend_id.clone(),
        tools: None,
    };

    let outcome = match ctx.llm_client.generate(input).await {
        Ok(stream) => crate::stream::collect(stream).await,
        Err(err) => Err(err),
    };

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            return Ok(ForcedConclusionOutcome::Failed(ExecutionResult::failed(
                format!("forced conclusion call failed after max iterations ({}): {err}", state.max_iterations),
                total_usage.clone(),
            )));
        }
    };

    if let Some(usage) = &response.usage {
        total_usage.accumulate(usage);
    }
    sink.record_llm_interaction(
        state.current_iteration,
        LlmInteractionType::ForcedConclusion,
        messages.len(),
        &response,
        None,
        started_at,
    )
    .await?;

    let assistant_message = ConversationMessage::assistant(response.text.clone());
    sink.store_messages(std::slice::from_ref(&assistant_message)).await?;
    messages.push(assistant_message);

    Ok(ForcedConclusionOutcome::Completed { raw_text: response.text })
}
