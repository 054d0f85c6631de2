//! Native-thinking controller: structured tool calling.
//!
//! Tools are bound to the request with provider-safe (`server__tool`)
//! names rather than described in the prompt; completion is signalled by
//! an empty `tool_calls` list rather than a parsed `Final Answer:`
//! marker. Code-execution and grounding chunks, when present, must
//! materialise as timeline events — something ReAct never does. Thinking
//! text and intermediate response text materialise too, gated by the
//! streaming collector's per-category flags so an empty category never
//! produces an empty event.

use std::time::Instant;

use async_trait::async_trait;

use crate::audit::{AuditSink, LlmInteractionType, TimelineEventType};
use crate::config::IterationStrategy;
use crate::context::ExecutionContext;
use crate::controller::forced_conclusion::{self, ForcedConclusionOutcome};
use crate::controller::state::IterationState;
use crate::controller::{Controller, ExecutionResult};
use crate::error::Result;
use crate::llm::GenerateInput;
use crate::message::ConversationMessage;
use crate::observation;
use crate::stream::{LlmResponse, StreamingAuditState, TokenUsage};
use crate::tools::{self, ToolDefinition};

pub struct NativeThinkingController;

#[async_trait]
impl Controller for NativeThinkingController {
    async fn run(&self, ctx: &ExecutionContext, prev_stage_context: Option<&str>) -> Result<ExecutionResult> {
        let sink = AuditSink::with_truncation_cap(
            ctx.services.clone(),
            ctx.execution_id.clone(),
            ctx.config.audit.storage_truncation_cap_tokens,
        );

        let mut messages = ctx.prompt_builder.build_native_thinking_messages(ctx, prev_stage_context).await?;
        sink.store_messages(&messages).await?;

        let tool_defs = tools::list_tools_with_audit(ctx, &sink).await?;
        let bound_tools: Vec<ToolDefinition> = tool_defs
            .into_iter()
            .map(|def| ToolDefinition { name: tools::normalize_for_provider(&def.name), ..def })
            .collect();

        let mut state = IterationState::new(ctx.config.max_iterations);
        let mut total_usage = TokenUsage::default();

        loop {
            if state.should_abort_on_timeouts() {
                let last_error = state.last_error_message.clone().unwrap_or_default();
                return Ok(ExecutionResult::failed(last_error, total_usage));
            }
            if state.budget_exhausted() {
                break;
            }
            state.begin_iteration();

            let started_at = Instant::now();
            let input = GenerateInput {
                session_id: ctx.session_id.clone(),
                execution_id: ctx.execution_id.clone(),
                messages: messages.clone(),
                provider_spec: ctx.config.provider_spec.clone(),
                backend_id: ctx.config.backend_id.clone(),
                tools: Some(bound_tools.clone()),
            };

            let call_outcome = tokio::time::timeout(ctx.config.iteration_timeout(), async {
                match ctx.llm_client.generate(input).await {
                    Ok(stream) => crate::stream::collect_with_audit(stream).await,
                    Err(err) => Err(err),
                }
            })
            .await;

            let (response, streaming_audit) = match call_outcome {
                Err(_elapsed) => {
                    let err = crate::error::Error::Timeout(format!(
                        "iteration {} exceeded {:?}",
                        state.current_iteration,
                        ctx.config.iteration_timeout()
                    ));
                    self.record_iteration_failure(&sink, &mut state, &mut messages, &err, true).await?;
                    continue;
                }
                Ok(Err(err)) => {
                    let is_timeout = err.is_timeout();
                    self.record_iteration_failure(&sink, &mut state, &mut messages, &err, is_timeout).await?;
                    continue;
                }
                Ok(Ok(response)) => response,
            };

            state.record_success();
            if let Some(usage) = &response.usage {
                total_usage.accumulate(usage);
            }
            sink.record_llm_interaction(
                state.current_iteration,
                LlmInteractionType::Investigation,
                messages.len(),
                &response,
                None,
                started_at,
            )
            .await?;

            self.emit_thinking_and_response_events(&sink, &response, &streaming_audit).await?;
            self.emit_native_events(&sink, &response).await?;

            if response.tool_calls.is_empty() {
                sink.create_timeline_event(TimelineEventType::FinalAnalysis, &response.text, serde_json::json!({}))
                    .await?;
                let assistant_message = ConversationMessage::assistant(response.text.clone());
                sink.store_messages(std::slice::from_ref(&assistant_message)).await?;
                messages.push(assistant_message);
                return Ok(ExecutionResult::completed(response.text, total_usage));
            }

            let assistant_message =
                ConversationMessage::assistant_with_tool_calls(response.text.clone(), response.tool_calls.clone());
            sink.store_messages(std::slice::from_ref(&assistant_message)).await?;
            messages.push(assistant_message);

            for call in &response.tool_calls {
                let result = tools::execute_tool_call(ctx, &sink, call).await?;
                if let Some(usage) = &result.usage {
                    total_usage.accumulate(usage);
                }
                let backend_name = tools::normalize_for_backend(&call.name);
                let tool_message = ConversationMessage::tool_result(call.id.clone(), backend_name, result.content.clone());
                sink.store_messages(std::slice::from_ref(&tool_message)).await?;
                messages.push(tool_message);
            }
        }

        match forced_conclusion::attempt(ctx, &sink, &state, IterationStrategy::NativeThinking, &mut messages, &mut total_usage).await? {
            ForcedConclusionOutcome::Failed(result) => Ok(result),
            ForcedConclusionOutcome::Completed { raw_text } => {
                sink.create_timeline_event(
                    TimelineEventType::FinalAnalysis,
                    &raw_text,
                    serde_json::json!({
                        "forced_conclusion": true,
                        "iterations_used": state.current_iteration,
                        "max_iterations": state.max_iterations,
                    }),
                )
                .await?;
                Ok(ExecutionResult::completed(raw_text, total_usage))
            }
        }
    }
}

impl NativeThinkingController {
    /// Emits `llm_thinking` and `llm_response` timeline events for
    /// categories the streaming collector actually observed, mirroring the
    /// ReAct controller's unconditional `llm_thinking` emission
    /// (`react.rs`) but gated by [`StreamingAuditState`] rather than a
    /// parsed `Thought:` marker.
    ///
    /// `llm_response` is only emitted when this iteration still has tool
    /// calls pending: a tool-call-free reply becomes `final_analysis`
    /// instead, and emitting both would duplicate the same text in the
    /// timeline.
    async fn emit_thinking_and_response_events(
        &self,
        sink: &AuditSink,
        response: &LlmResponse,
        streaming_audit: &StreamingAuditState,
    ) -> Result<()> {
        if streaming_audit.thinking_emitted && !response.thinking_text.is_empty() {
            sink.create_timeline_event(TimelineEventType::LlmThinking, &response.thinking_text, serde_json::json!({}))
                .await?;
        }

        if streaming_audit.text_emitted && !response.text.is_empty() && !response.tool_calls.is_empty() {
            sink.create_timeline_event(TimelineEventType::LlmResponse, &response.text, serde_json::json!({}))
                .await?;
        }

        Ok(())
    }

    /// Materialises code-execution and grounding chunks as timeline
    /// events. Groundings only materialise when they carry non-empty
    /// sources; a grounding with search queries becomes
    /// `google_search_result`, otherwise `url_context_result`.
    async fn emit_native_events(&self, sink: &AuditSink, response: &LlmResponse) -> Result<()> {
        for exec in &response.code_executions {
            sink.create_timeline_event(
                TimelineEventType::CodeExecution,
                &format!("{}\n{}", exec.code, exec.result),
                serde_json::json!({ "code": exec.code }),
            )
            .await?;
        }

        for grounding in &response.groundings {
            if grounding.sources.is_empty() {
                continue;
            }
            let event_type = if grounding.web_search_queries.is_empty() {
                TimelineEventType::UrlContextResult
            } else {
                TimelineEventType::GoogleSearchResult
            };
            sink.create_timeline_event(
                event_type,
                &grounding.sources.join("\n"),
                serde_json::json!({
                    "web_search_queries": grounding.web_search_queries,
                    "supports": grounding.supports,
                }),
            )
            .await?;
        }

        Ok(())
    }

    async fn record_iteration_failure(
        &self,
        sink: &AuditSink,
        state: &mut IterationState,
        messages: &mut Vec<ConversationMessage>,
        err: &crate::error::Error,
        is_timeout: bool,
    ) -> Result<()> {
        sink.create_timeline_event(
            TimelineEventType::Error,
            &err.to_string(),
            serde_json::json!({ "iteration": state.current_iteration }),
        )
        .await?;
        state.record_failure(err.to_string(), is_timeout);
        let observation_text = observation::format_error_observation(&err.to_string());
        let message = ConversationMessage::user(observation_text);
        sink.store_messages(std::slice::from_ref(&message)).await?;
        messages.push(message);
        Ok(())
    }
}
