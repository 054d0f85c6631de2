//! ReAct controller: text-based tool calling.
//!
//! Tools are described in the system prompt rather than bound to the
//! request; each reply is parsed for `Thought`/`Action`/`Action Input`/
//! `Final Answer` markers. Native-tool stream data (code executions,
//! groundings) is intentionally ignored here — ReAct never binds tools,
//! so a conforming `LlmClient` never emits them for this strategy, and
//! this controller does not surface them even if one did.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::{AuditSink, LlmInteractionType, TimelineEventType};
use crate::config::IterationStrategy;
use crate::context::ExecutionContext;
use crate::controller::forced_conclusion::{self, ForcedConclusionOutcome};
use crate::controller::state::IterationState;
use crate::controller::{Controller, ExecutionResult};
use crate::error::Result;
use crate::llm::GenerateInput;
use crate::message::{ConversationMessage, ToolCall};
use crate::observation;
use crate::react_parser;
use crate::stream::TokenUsage;
use crate::tools;

pub struct ReActController;

#[async_trait]
impl Controller for ReActController {
    async fn run(&self, ctx: &ExecutionContext, prev_stage_context: Option<&str>) -> Result<ExecutionResult> {
        let sink = AuditSink::with_truncation_cap(
            ctx.services.clone(),
            ctx.execution_id.clone(),
            ctx.config.audit.storage_truncation_cap_tokens,
        );

        let mut messages = ctx.prompt_builder.build_react_messages(ctx, prev_stage_context).await?;
        sink.store_messages(&messages).await?;

        let tool_defs = tools::list_tools_with_audit(ctx, &sink).await?;
        let tool_names: HashSet<String> = tool_defs.iter().map(|t| t.name.clone()).collect();
        let available_tool_names: Vec<String> = tool_defs.into_iter().map(|t| t.name).collect();

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
                tools: None,
            };

            let call_outcome = tokio::time::timeout(ctx.config.iteration_timeout(), async {
                match ctx.llm_client.generate(input).await {
                    Ok(stream) => crate::stream::collect(stream).await,
                    Err(err) => Err(err),
                }
            })
            .await;

            let response = match call_outcome {
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

            let assistant_message = ConversationMessage::assistant(response.text.clone());
            sink.store_messages(std::slice::from_ref(&assistant_message)).await?;
            messages.push(assistant_message);

            let parsed = react_parser::parse(&response.text);
            if !parsed.thought.is_empty() {
                sink.create_timeline_event(TimelineEventType::LlmThinking, &parsed.thought, serde_json::json!({}))
                    .await?;
            }

            if parsed.is_final_answer {
                sink.create_timeline_event(
                    TimelineEventType::FinalAnalysis,
                    &parsed.final_answer,
                    serde_json::json!({}),
                )
                .await?;
                return Ok(ExecutionResult::completed(parsed.final_answer, total_usage));
            }

            if parsed.has_action && tool_names.contains(&parsed.action) {
                let call = ToolCall { id: Uuid::new_v4().to_string(), name: parsed.action.clone(), arguments: parsed.action_input.clone() };
                let result = tools::execute_tool_call(ctx, &sink, &call).await?;
                if let Some(usage) = &result.usage {
                    total_usage.accumulate(usage);
                }
                let observation_text = if result.is_error {
                    observation::format_tool_error_observation(&result.content)
                } else {
                    observation::format_observation(&result.content)
                };
                self.append_observation(&sink, &mut messages, observation_text).await?;
                continue;
            }

            if parsed.has_action {
                let observation_text =
                    observation::format_unknown_tool_error(&parsed.action, "no tool registered with that name", &available_tool_names);
                self.append_observation(&sink, &mut messages, observation_text).await?;
                continue;
            }

            if parsed.is_unknown_tool {
                let observation_text =
                    observation::format_unknown_tool_error(&parsed.action, &parsed.error_message, &available_tool_names);
                self.append_observation(&sink, &mut messages, observation_text).await?;
                continue;
            }

            let observation_text = observation::format_malformed_response_hint();
            self.append_observation(&sink, &mut messages, observation_text).await?;
        }

        match forced_conclusion::attempt(ctx, &sink, &state, IterationStrategy::React, &mut messages, &mut total_usage).await? {
            ForcedConclusionOutcome::Failed(result) => Ok(result),
            ForcedConclusionOutcome::Completed { raw_text } => {
                let parsed = react_parser::parse(&raw_text);
                let final_text = if parsed.is_final_answer { parsed.final_answer } else { raw_text };
                sink.create_timeline_event(
                    TimelineEventType::FinalAnalysis,
                    &final_text,
                    serde_json::json!({
                        "forced_conclusion": true,
                        "iterations_used": state.current_iteration,
                        "max_iterations": state.max_iterations,
                    }),
                )
                .await?;
                Ok(ExecutionResult::completed(final_text, total_usage))
            }
        }
    }
}

impl ReActController {
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
        self.append_observation(sink, messages, observation_text).await
    }

    async fn append_observation(
        &self,
        sink: &AuditSink,
        messages: &mut Vec<ConversationMessage>,
        text: String,
    ) -> Result<()> {
        let message = ConversationMessage::user(text);
        sink.store_messages(std::slice::from_ref(&message)).await?;
        messages.push(message);
        Ok(())
    }
}
