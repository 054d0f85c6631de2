//! Fail-open summarization of oversized tool results before they are
//! appended to the conversation.
//!
//! The summarization call is *not* an iteration: it must not advance the
//! iteration counter, but its token usage is still accumulated into the
//! run total (see `controller::state::IterationState`).

use tracing::error;

use crate::audit::{AuditSink, LlmInteractionType, TimelineEventType};
use crate::context::ExecutionContext;
use crate::llm::GenerateInput;
use crate::message::ConversationMessage;
use crate::stream::TokenUsage;

/// Result of a (possibly skipped) summarization pass.
pub struct SummarizeOutcome {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

fn estimate_tokens(content: &str) -> u32 {
    ((content.len() as u32) + 3) / 4
}

fn summarization_prompt(tool_name: &str, content: &str, max_tokens: u32) -> String {
    format!(
        "Summarize the following output of the tool \"{tool_name}\" in no more than \
         approximately {max_tokens} tokens. Preserve concrete facts, numbers, and error \
         messages; omit formatting and repetition.\n\n---\n{content}\n---"
    )
}

/// Summarizes `raw_content` returned by `tool_name` on `server_name`:
///
/// 1. No config for `server_name`, or `enabled == false` → return as-is.
/// 2. Token estimate at or under the threshold → return as-is.
/// 3. Otherwise issue a bounded LLM call; on any error or empty response,
///    fail open and return the original content unchanged, logging an
///    `error` timeline event. Swallowed failures do not count against the
///    iteration-failure counter (the caller never sees an `Err` here).
pub async fn summarize(
    ctx: &ExecutionContext,
    sink: &AuditSink,
    server_name: &str,
    tool_name: &str,
    raw_content: &str,
) -> SummarizeOutcome {
    let Some(config) = ctx.config.summarization_for(server_name).filter(|c| c.enabled) else {
        return SummarizeOutcome { content: raw_content.to_string(), usage: None };
    };

    let estimated = estimate_tokens(raw_content);
    if estimated <= config.size_threshold_tokens {
        return SummarizeOutcome { content: raw_content.to_string(), usage: None };
    }

    let prompt = summarization_prompt(tool_name, raw_content, config.summary_max_tokens);
    let input = GenerateInput {
        session_id: ctx.session_id.clone(),
        execution_id: ctx.execution_id.clone(),
        messages: vec![ConversationMessage::user(prompt)],
        provider_spec: ctx.config.provider_spec.clone(),
        backend_id: ctx.config.backend_id.clone(),
        tools: None,
    };

    let started_at = std::time::Instant::now();
    let outcome = match ctx.llm_client.generate(input).await {
        Ok(stream) => crate::stream::collect(stream).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(response) if !response.text.trim().is_empty() => {
            let _ = sink
                .record_llm_interaction(
                    0,
                    LlmInteractionType::Summarization,
                    1,
                    &response,
                    None,
                    started_at,
                )
                .await;
            SummarizeOutcome { content: response.text, usage: response.usage }
        }
        Ok(_) => {
            fail_open(sink, server_name, tool_name, "summarizer returned an empty response").await;
            SummarizeOutcome { content: raw_content.to_string(), usage: None }
        }
        Err(err) => {
            fail_open(sink, server_name, tool_name, &err.to_string()).await;
            SummarizeOutcome { content: raw_content.to_string(), usage: None }
        }
    }
}

async fn fail_open(sink: &AuditSink, server_name: &str, tool_name: &str, reason: &str) {
    error!(server = %server_name, tool = %tool_name, reason, "summarization failed open");
    let _ = sink
        .create_timeline_event(
            TimelineEventType::Error,
            &format!("summarization for {server_name}.{tool_name} failed open: {reason}"),
            serde_json::json!({ "server_name": server_name, "tool_name": tool_name }),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResolvedConfig, SummarizationConfig};
    use crate::context::ExecutionContext;
    use crate::error::Error;
    use crate::testutil::{FakeLlmClient, FakePromptBuilder, FakeToolExecutor, InMemoryServiceBundle};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx_with(
        summarization: HashMap<String, SummarizationConfig>,
        llm: FakeLlmClient,
    ) -> (ExecutionContext, Arc<InMemoryServiceBundle>) {
        let services = Arc::new(InMemoryServiceBundle::default());
        let config = ResolvedConfig {
            max_iterations: 10,
            iteration_timeout_secs: 30,
            provider_spec: "test-provider".into(),
            backend_id: "test-backend".into(),
            custom_instructions: None,
            strategy: crate::config::IterationStrategy::React,
            summarization,
            audit: Default::default(),
        };
        let ctx = ExecutionContext::new(
            "session-1",
            "stage-1",
            "exec-1",
            "agent",
            "alert",
            "runbook",
            config,
            Arc::new(llm),
            Arc::new(FakeToolExecutor::default()),
            Arc::new(FakePromptBuilder::default()),
            services.clone(),
        );
        (ctx, services)
    }

    #[tokio::test]
    async fn returns_raw_content_when_no_config_for_server() {
        let (ctx, services) = ctx_with(HashMap::new(), FakeLlmClient::default());
        let sink = AuditSink::new(services, "exec-1");
        let out = summarize(&ctx, &sink, "k8s", "get_pods", "short content").await;
        assert_eq!(out.content, "short content");
        assert!(out.usage.is_none());
    }

    #[tokio::test]
    async fn returns_raw_content_under_threshold() {
        let mut summarization = HashMap::new();
        summarization.insert(
            "k8s".to_string(),
            SummarizationConfig { enabled: true, size_threshold_tokens: 1000, summary_max_tokens: 500 },
        );
        let (ctx, services) = ctx_with(summarization, FakeLlmClient::default());
        let sink = AuditSink::new(services, "exec-1");
        let out = summarize(&ctx, &sink, "k8s", "get_pods", "short content").await;
        assert_eq!(out.content, "short content");
    }

    #[tokio::test]
    async fn summarizes_when_over_threshold() {
        let mut summarization = HashMap::new();
        summarization.insert(
            "k8s".to_string(),
            SummarizationConfig { enabled: true, size_threshold_tokens: 100, summary_max_tokens: 500 },
        );
        let big_content = "x".repeat(2800);
        let llm = FakeLlmClient::new(vec![FakeLlmClient::text_reply("a short summary")]);
        let (ctx, services) = ctx_with(summarization, llm);
        let sink = AuditSink::new(services.clone(), "exec-1");
        let out = summarize(&ctx, &sink, "k8s", "get_pods", &big_content).await;
        assert_eq!(out.content, "a short summary");
        assert_eq!(services.llm_interactions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fails_open_on_llm_error() {
        let mut summarization = HashMap::new();
        summarization.insert(
            "k8s".to_string(),
            SummarizationConfig { enabled: true, size_threshold_tokens: 100, summary_max_tokens: 500 },
        );
        let big_content = "y".repeat(2800);
        let llm = FakeLlmClient::new(vec![crate::testutil::FakeReply::Error(Error::Llm("boom".into()))]);
        let (ctx, services) = ctx_with(summarization, llm);
        let sink = AuditSink::new(services.clone(), "exec-1");
        let out = summarize(&ctx, &sink, "k8s", "get_pods", &big_content).await;
        assert_eq!(out.content, big_content);
        assert!(out.usage.is_none());
        let events = services.timeline.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TimelineEventType::Error);
    }
}
