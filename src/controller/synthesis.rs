//! Synthesis and synthesis-native-thinking controller.
//!
//! Single LLM call, no tool loop: build one prompt, persist it, call the
//! LLM without tools, persist the reply, emit one `final_analysis` event,
//! record one LLM interaction, return. The two strategy names differ only
//! in `ctx.config.backend_id`, resolved entirely by the `LlmClient`
//! collaborator; this controller runs the identical sequence for both.

use std::time::Instant;

use async_trait::async_trait;

use crate::audit::{AuditSink, LlmInteractionType, TimelineEventType};
use crate::context::ExecutionContext;
use crate::controller::{Controller, ExecutionResult};
use crate::error::Result;
use crate::llm::GenerateInput;
use crate::message::ConversationMessage;
use crate::stream::TokenUsage;

pub struct SynthesisController;

#[async_trait]
impl Controller for SynthesisController {
    async fn run(&self, ctx: &ExecutionContext, prev_stage_context: Option<&str>) -> Result<ExecutionResult> {
        let sink = AuditSink::with_truncation_cap(
            ctx.services.clone(),
            ctx.execution_id.clone(),
            ctx.config.audit.storage_truncation_cap_tokens,
        );

        let messages = ctx.prompt_builder.build_synthesis_messages(ctx, prev_stage_context).await?;
        sink.store_messages(&messages).await?;

        let started_at = Instant::now();
        let input = GenerateInput {
            session_id: ctx.session_id.clone(),
            execution_id: ctx.execution_id.clone(),
            messages: messages.clone(),
            provider_spec: ctx.config.provider_spec.clone(),
            backend_id: ctx.config.backend_id.clone(),
            tools: None,
        };

        let outcome = match tokio::time::timeout(ctx.config.iteration_timeout(), ctx.llm_client.generate(input)).await {
            Ok(Ok(stream)) => crate::stream::collect(stream).await,
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(crate::error::Error::Timeout(format!(
                "synthesis call exceeded {:?}",
                ctx.config.iteration_timeout()
            ))),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                sink.create_timeline_event(TimelineEventType::Error, &err.to_string(), serde_json::json!({}))
                    .await?;
                return Ok(ExecutionResult::failed(err.to_string(), TokenUsage::default()));
            }
        };

        let mut total_usage = TokenUsage::default();
        if let Some(usage) = &response.usage {
            total_usage.accumulate(usage);
        }
        sink.record_llm_interaction(0, LlmInteractionType::Investigation, messages.len(), &response, None, started_at)
            .await?;

        sink.create_timeline_event(TimelineEventType::FinalAnalysis, &response.text, serde_json::json!({}))
            .await?;

        let assistant_message = ConversationMessage::assistant(response.text.clone());
        sink.store_messages(std::slice::from_ref(&assistant_message)).await?;

        Ok(ExecutionResult::completed(response.text, total_usage))
    }
}
