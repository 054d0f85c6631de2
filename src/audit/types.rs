//! Persisted audit record shapes: timeline events, messages, and the two
//! interaction record kinds (MCP tool calls, LLM calls).

use serde::{Deserialize, Serialize};

use crate::message::ConversationMessage;
use crate::stream::TokenUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    LlmThinking,
    LlmResponse,
    LlmToolCall,
    FinalAnalysis,
    CodeExecution,
    GoogleSearchResult,
    UrlContextResult,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventStatus {
    Streaming,
    Completed,
}

/// One row in an execution's timeline. `sequence_number` is assigned by
/// [`super::AuditSink`] and is strictly increasing within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub execution_id: String,
    pub sequence_number: i64,
    pub event_type: TimelineEventType,
    pub status: TimelineEventStatus,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// A persisted conversation turn, mirroring [`ConversationMessage`] plus
/// identity assigned by the audit sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub execution_id: String,
    pub sequence_number: i64,
    pub message: ConversationMessage,
}

/// Which internal LLM call produced an [`LlmInteraction`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmInteractionType {
    Investigation,
    Summarization,
    ForcedConclusion,
}

/// Audit record of one LLM call, independent of whether it succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub execution_id: String,
    pub iteration: u32,
    pub interaction_type: LlmInteractionType,
    pub messages_sent_count: usize,
    pub response_text: String,
    pub response_thinking: String,
    pub token_usage: Option<TokenUsage>,
    pub duration_ms: u64,
    pub last_message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpInteractionType {
    ToolCall,
    ToolList,
}

/// Audit record of one tool call or tool-list request against a tool
/// backend server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpInteraction {
    pub execution_id: String,
    pub server_name: String,
    pub tool_name: String,
    pub interaction_type: McpInteractionType,
    /// Parsed JSON arguments, or `{"raw": "<string>"}` if the raw argument
    /// string did not parse as JSON, or `null` if it was empty.
    pub tool_arguments: serde_json::Value,
    pub tool_result: serde_json::Value,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub available_tools: Option<Vec<String>>,
}

/// Parses a tool call's raw argument string for [`McpInteraction::tool_arguments`].
pub fn parse_tool_arguments(raw: &str) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "raw": raw }))
}
