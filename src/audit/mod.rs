//! Audit sink: the orchestration layer that turns controller-observed
//! events into persisted rows via the narrow service-bundle traits below.
//!
//! The service-bundle traits are the persistence services, consumed as an
//! external collaborator; [`AuditSink`] itself is in-scope orchestration
//! logic built on top of them, in the same spirit as a narrow
//! `StorageBackend`/`MemoryBackend` split.

pub mod types;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::DEFAULT_STORAGE_TRUNCATION_CAP_TOKENS;
use crate::error::Result;
use crate::message::ConversationMessage;
use crate::stream::LlmResponse;
use crate::tools::ToolResult;

pub use types::{
    LlmInteraction, LlmInteractionType, McpInteraction, McpInteractionType, PersistedMessage,
    TimelineEvent, TimelineEventStatus, TimelineEventType,
};

/// Stores conversation messages. One of the narrow service-bundle traits;
/// implemented concretely by [`crate::persistence::postgres`] or by a test
/// fake.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn store_message(&self, message: PersistedMessage) -> Result<()>;
}

/// Creates and completes timeline events. `create_event` returns an
/// opaque event id used by a later `complete_event` call.
#[async_trait]
pub trait TimelineService: Send + Sync {
    async fn create_event(&self, event: TimelineEvent) -> Result<i64>;
    async fn complete_event(&self, event_id: i64, content: String, metadata: serde_json::Value) -> Result<()>;
}

/// Records the two audit-interaction kinds.
#[async_trait]
pub trait InteractionService: Send + Sync {
    async fn record_llm_interaction(&self, interaction: LlmInteraction) -> Result<()>;
    async fn record_mcp_interaction(&self, interaction: McpInteraction) -> Result<()>;
}

/// Looks up prior-stage context for a multi-stage investigation. Narrow by
/// design: this crate never needs more than this one read.
#[async_trait]
pub trait StageService: Send + Sync {
    async fn previous_stage_context(&self, stage_id: &str) -> Result<Option<String>>;
}

/// Aggregates the four narrow service traits behind one handle carried on
/// `ExecutionContext`, in the same spirit as a unified storage facade.
pub trait ServiceBundle: Send + Sync {
    fn messages(&self) -> &dyn MessageService;
    fn timeline(&self) -> &dyn TimelineService;
    fn interactions(&self) -> &dyn InteractionService;
    fn stages(&self) -> &dyn StageService;
}

/// Token-estimate helper shared with the summarizer: `ceil(len / 4)`.
fn estimate_tokens(content: &str) -> u32 {
    ((content.len() as u32) + 3) / 4
}

struct OpenToolCallEvent {
    event_id: i64,
    tool_name: String,
    arguments: String,
}

/// Owns the per-execution sequence counters and dispatches to the
/// [`ServiceBundle`] traits. One instance per controller run.
pub struct AuditSink {
    services: std::sync::Arc<dyn ServiceBundle>,
    execution_id: String,
    truncation_cap_tokens: u32,
    message_seq: AtomicI64,
    timeline_seq: AtomicI64,
    open_tool_call: Mutex<Option<OpenToolCallEvent>>,
}

impl AuditSink {
    pub fn new(services: std::sync::Arc<dyn ServiceBundle>, execution_id: impl Into<String>) -> Self {
        Self::with_truncation_cap(services, execution_id, DEFAULT_STORAGE_TRUNCATION_CAP_TOKENS)
    }

    pub fn with_truncation_cap(
        services: std::sync::Arc<dyn ServiceBundle>,
        execution_id: impl Into<String>,
        truncation_cap_tokens: u32,
    ) -> Self {
        Self {
            services,
            execution_id: execution_id.into(),
            truncation_cap_tokens,
            message_seq: AtomicI64::new(0),
            timeline_seq: AtomicI64::new(0),
            open_tool_call: Mutex::new(None),
        }
    }

    fn next_message_seq(&self) -> i64 {
        self.message_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn next_timeline_seq(&self) -> i64 {
        self.timeline_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Truncates content for storage if its token estimate exceeds the
    /// configured cap, appending the `[TRUNCATED: <N> tokens]` marker.
    /// Independent of summarization, which shortens content *before* it
    /// ever reaches the sink.
    fn truncate_for_storage(&self, content: &str) -> String {
        let estimated = estimate_tokens(content);
        if estimated <= self.truncation_cap_tokens {
            return content.to_string();
        }
        let cap_chars = (self.truncation_cap_tokens as usize) * 4;
        let truncated: String = content.chars().take(cap_chars).collect();
        format!("{truncated}\n[TRUNCATED: {estimated} tokens]")
    }

    /// Persists a batch of messages, assigning each a fresh sequence
    /// number in order. Failure here aborts the run.
    pub async fn store_messages(&self, messages: &[ConversationMessage]) -> Result<()> {
        for message in messages {
            let sequence_number = self.next_message_seq();
            self.services
                .messages()
                .store_message(PersistedMessage {
                    execution_id: self.execution_id.clone(),
                    sequence_number,
                    message: message.clone(),
                })
                .await?;
        }
        Ok(())
    }

    /// Creates a completed (non tool-call) timeline event.
    pub async fn create_timeline_event(
        &self,
        event_type: TimelineEventType,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let sequence_number = self.next_timeline_seq();
        self.services
            .timeline()
            .create_event(TimelineEvent {
                execution_id: self.execution_id.clone(),
                sequence_number,
                event_type,
                status: TimelineEventStatus::Completed,
                content: self.truncate_for_storage(content),
                metadata,
            })
            .await?;
        Ok(())
    }

    /// Opens a streaming `llm_tool_call` event. Must be paired with
    /// exactly one [`Self::create_tool_result_event`] call before another
    /// tool call event is opened.
    pub async fn create_tool_call_event(&self, tool_name: &str, arguments: &str) -> Result<()> {
        let sequence_number = self.next_timeline_seq();
        let event_id = self
            .services
            .timeline()
            .create_event(TimelineEvent {
                execution_id: self.execution_id.clone(),
                sequence_number,
                event_type: TimelineEventType::LlmToolCall,
                status: TimelineEventStatus::Streaming,
                content: String::new(),
                metadata: serde_json::json!({ "tool_name": tool_name, "arguments": arguments }),
            })
            .await?;

        let mut open = self.open_tool_call.lock().unwrap();
        if open.is_some() {
            warn!("a new tool call event was opened before the previous one was completed");
        }
        *open = Some(OpenToolCallEvent {
            event_id,
            tool_name: tool_name.to_string(),
            arguments: arguments.to_string(),
        });
        Ok(())
    }

    /// Completes the most recently opened tool-call event.
    pub async fn create_tool_result_event(&self, content: &str, is_error: bool) -> Result<()> {
        let open = self.open_tool_call.lock().unwrap().take();
        let Some(open) = open else {
            return Err(crate::error::Error::Internal(
                "create_tool_result_event called with no open tool call event".into(),
            ));
        };
        let stored_content = self.truncate_for_storage(content);
        self.services
            .timeline()
            .complete_event(
                open.event_id,
                stored_content,
                serde_json::json!({
                    "tool_name": open.tool_name,
                    "is_error": is_error,
                    "arguments": open.arguments,
                }),
            )
            .await?;
        Ok(())
    }

    /// Records one LLM interaction row (investigation, summarization, or
    /// forced-conclusion call). Call this regardless of whether the call
    /// succeeded; `response` should reflect whatever was collected before
    /// any failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_llm_interaction(
        &self,
        iteration: u32,
        interaction_type: LlmInteractionType,
        messages_sent_count: usize,
        response: &LlmResponse,
        last_message_id: Option<String>,
        started_at: Instant,
    ) -> Result<()> {
        let duration_ms = started_at.elapsed().as_millis() as u64;
        self.services
            .interactions()
            .record_llm_interaction(LlmInteraction {
                execution_id: self.execution_id.clone(),
                iteration,
                interaction_type,
                messages_sent_count,
                response_text: response.text.clone(),
                response_thinking: response.thinking_text.clone(),
                token_usage: response.usage.clone(),
                duration_ms,
                last_message_id,
            })
            .await
    }

    /// Records one MCP interaction row for a completed tool call.
    pub async fn record_mcp_interaction(
        &self,
        server_name: &str,
        tool_name: &str,
        raw_arguments: &str,
        result: &ToolResult,
        duration_ms: u64,
    ) -> Result<()> {
        debug!(server = %server_name, tool = %tool_name, "recording MCP interaction");
        self.services
            .interactions()
            .record_mcp_interaction(McpInteraction {
                execution_id: self.execution_id.clone(),
                server_name: server_name.to_string(),
                tool_name: tool_name.to_string(),
                interaction_type: McpInteractionType::ToolCall,
                tool_arguments: types::parse_tool_arguments(raw_arguments),
                tool_result: serde_json::json!({
                    "content": result.content,
                    "is_error": result.is_error,
                }),
                duration_ms,
                error_message: if result.is_error { Some(result.content.clone()) } else { None },
                available_tools: None,
            })
            .await
    }

    /// Records one `tool_list` MCP interaction row for a server queried via
    /// `ToolExecutor::list_tools`. One row per server: `available_tools`
    /// carries the tool names that server advertised.
    pub async fn record_mcp_tool_list_interaction(
        &self,
        server_name: &str,
        available_tools: &[String],
        duration_ms: u64,
    ) -> Result<()> {
        debug!(server = %server_name, count = available_tools.len(), "recording MCP tool-list interaction");
        self.services
            .interactions()
            .record_mcp_interaction(McpInteraction {
                execution_id: self.execution_id.clone(),
                server_name: server_name.to_string(),
                tool_name: String::new(),
                interaction_type: McpInteractionType::ToolList,
                tool_arguments: serde_json::Value::Null,
                tool_result: serde_json::json!({ "count": available_tools.len() }),
                duration_ms,
                error_message: None,
                available_tools: Some(available_tools.to_vec()),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::InMemoryServiceBundle;
    use std::sync::Arc;

    fn sink() -> (AuditSink, Arc<InMemoryServiceBundle>) {
        let services = Arc::new(InMemoryServiceBundle::default());
        let sink = AuditSink::new(services.clone(), "exec-1");
        (sink, services)
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic_across_messages_and_events() {
        let (sink, services) = sink();
        sink.store_messages(&[ConversationMessage::user("hi"), ConversationMessage::assistant("hello")])
            .await
            .unwrap();
        sink.create_timeline_event(TimelineEventType::LlmResponse, "hello", serde_json::json!({}))
            .await
            .unwrap();

        let messages = services.messages.lock().unwrap();
        assert_eq!(messages[0].sequence_number, 0);
        assert_eq!(messages[1].sequence_number, 1);

        let events = services.timeline.lock().unwrap();
        assert_eq!(events[0].sequence_number, 0);
    }

    #[tokio::test]
    async fn tool_call_lifecycle_completes_exactly_once() {
        let (sink, services) = sink();
        sink.create_tool_call_event("k8s.get_pods", "{}").await.unwrap();
        sink.create_tool_result_event("pod-1 Running", false).await.unwrap();

        let events = services.timeline.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, TimelineEventStatus::Completed);
        assert_eq!(events[0].metadata["is_error"], false);
    }

    #[tokio::test]
    async fn oversized_content_is_truncated_with_marker() {
        let (sink, services) = sink();
        let huge = "x".repeat(40_000);
        sink.create_timeline_event(TimelineEventType::LlmResponse, &huge, serde_json::json!({}))
            .await
            .unwrap();

        let events = services.timeline.lock().unwrap();
        assert!(events[0].content.len() < huge.len());
        assert!(events[0].content.contains("[TRUNCATED:"));
    }
}
