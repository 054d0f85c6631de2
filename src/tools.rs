//! Tool definitions, the `ToolExecutor` collaborator trait, and the
//! per-call wrapper that normalises names, summarizes oversized results,
//! and records audit events around a single tool invocation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::AuditSink;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::message::ToolCall;
use crate::summarizer;

/// A tool the executor backend can run, as surfaced to the LLM (ReAct:
/// described in the prompt text; native-thinking: bound to the request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// `server.tool`, the canonical dotted form used everywhere except on
    /// the wire to native-function-calling providers.
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn server_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    pub fn tool_name(&self) -> &str {
        self.name.split('.').nth(1).unwrap_or("")
    }
}

/// The result of one tool invocation, before summarization.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
    /// Token usage contributed by a summarization call made on this
    /// result's content, if any.
    pub usage: Option<crate::stream::TokenUsage>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), name: name.into(), content: content.into(), is_error: false, usage: None }
    }

    pub fn failure(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), name: name.into(), content: content.into(), is_error: true, usage: None }
    }
}

/// External collaborator that dispatches a tool call to whatever backend
/// hosts it (an MCP server, a local function, etc). Transport concerns —
/// spawning processes, stdio framing — live entirely on the other side of
/// this trait.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Lists the tools currently available, in `server.tool` form.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Executes one call. `name` is already normalised back to
    /// `server.tool` form by the time this is invoked.
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;
}

/// Converts a dotted tool name to the double-underscore form some LLM
/// providers require (they reject `.` in function names).
pub fn normalize_for_provider(name: &str) -> String {
    name.replace('.', "__")
}

/// Reverses [`normalize_for_provider`].
pub fn normalize_for_backend(name: &str) -> String {
    name.replacen("__", ".", 1)
}

/// Splits a `server.tool` (or `server__tool`) name into its two halves for
/// audit purposes. Falls back to `(name, "")` if no separator is present.
pub fn split_server_and_tool(name: &str) -> (String, String) {
    if let Some((server, tool)) = name.split_once('.') {
        return (server.to_string(), tool.to_string());
    }
    if let Some((server, tool)) = name.split_once("__") {
        return (server.to_string(), tool.to_string());
    }
    (name.to_string(), String::new())
}

/// Lists tools via the executor and records one `tool_list` MCP
/// interaction per server advertised.
pub async fn list_tools_with_audit(ctx: &ExecutionContext, sink: &AuditSink) -> Result<Vec<ToolDefinition>> {
    let started_at = std::time::Instant::now();
    let tool_defs = ctx.tool_executor.list_tools().await?;
    let duration_ms = started_at.elapsed().as_millis() as u64;

    let mut by_server: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for def in &tool_defs {
        by_server.entry(def.server_name().to_string()).or_default().push(def.tool_name().to_string());
    }
    for (server_name, tool_names) in by_server {
        sink.record_mcp_tool_list_interaction(&server_name, &tool_names, duration_ms).await?;
    }

    Ok(tool_defs)
}

/// Runs the full per-call wrapper: normalise the name, emit the streaming
/// timeline event, dispatch, summarize, complete the timeline event, and
/// record the MCP interaction.
///
/// Returns a [`ToolResult`] even on executor failure (the failure is
/// folded into `is_error`/`content`); only audit-sink failures propagate.
pub async fn execute_tool_call(
    ctx: &ExecutionContext,
    sink: &AuditSink,
    call: &ToolCall,
) -> Result<ToolResult> {
    let backend_name = normalize_for_backend(&call.name);
    let (server_name, tool_name) = split_server_and_tool(&backend_name);

    let backend_call = ToolCall { id: call.id.clone(), name: backend_name.clone(), arguments: call.arguments.clone() };

    sink.create_tool_call_event(&backend_name, &call.arguments).await?;

    let started_at = std::time::Instant::now();
    info!(tool = %backend_name, "dispatching tool call");

    let outcome = ctx.tool_executor.execute(&backend_call).await;
    let duration_ms = started_at.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(mut result) => {
            let summarized = summarizer::summarize(ctx, sink, &server_name, &tool_name, &result.content).await;
            result.content = summarized.content;
            result.usage = summarized.usage;
            result
        }
        Err(err) => {
            warn!(tool = %backend_name, error = %err, "tool execution failed");
            ToolResult::failure(call.id.clone(), backend_name.clone(), err.to_string())
        }
    };

    sink.create_tool_result_event(&result.content, result.is_error).await?;
    sink.record_mcp_interaction(&server_name, &tool_name, &call.arguments, &result, duration_ms)
        .await?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_round_trips() {
        assert_eq!(normalize_for_provider("k8s.get_pods"), "k8s__get_pods");
        assert_eq!(normalize_for_backend("k8s__get_pods"), "k8s.get_pods");
    }

    #[test]
    fn split_handles_both_separators() {
        assert_eq!(split_server_and_tool("k8s.get_pods"), ("k8s".to_string(), "get_pods".to_string()));
        assert_eq!(split_server_and_tool("k8s__get_pods"), ("k8s".to_string(), "get_pods".to_string()));
    }

    #[test]
    fn split_falls_back_without_separator() {
        assert_eq!(split_server_and_tool("bogus"), ("bogus".to_string(), String::new()));
    }

    #[tokio::test]
    async fn list_tools_with_audit_records_one_row_per_server() {
        use crate::config::{IterationStrategy, ResolvedConfig};
        use crate::testutil::{FakeLlmClient, FakePromptBuilder, FakeToolExecutor, InMemoryServiceBundle};
        use std::sync::Arc;

        let definitions = vec![
            ToolDefinition { name: "k8s.get_pods".into(), description: "".into(), parameters_schema: serde_json::json!({}) },
            ToolDefinition { name: "k8s.get_logs".into(), description: "".into(), parameters_schema: serde_json::json!({}) },
            ToolDefinition { name: "github.list_issues".into(), description: "".into(), parameters_schema: serde_json::json!({}) },
        ];
        let tool_executor = FakeToolExecutor::new(definitions, std::collections::HashMap::new());

        let services = Arc::new(InMemoryServiceBundle::default());
        let config = ResolvedConfig {
            max_iterations: 10,
            iteration_timeout_secs: 30,
            provider_spec: "test".into(),
            backend_id: "test".into(),
            custom_instructions: None,
            strategy: IterationStrategy::React,
            summarization: Default::default(),
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
            Arc::new(FakeLlmClient::default()),
            Arc::new(tool_executor),
            Arc::new(FakePromptBuilder::default()),
            services.clone(),
        );
        let sink = AuditSink::new(services.clone(), "exec-1");

        let defs = list_tools_with_audit(&ctx, &sink).await.unwrap();
        assert_eq!(defs.len(), 3);

        let interactions = services.mcp_interactions.lock().unwrap();
        assert_eq!(interactions.len(), 2, "one tool_list row per distinct server");
        let github_row = interactions.iter().find(|i| i.server_name == "github").unwrap();
        assert_eq!(github_row.interaction_type, crate::audit::McpInteractionType::ToolList);
        assert_eq!(github_row.available_tools.as_deref(), Some(&["list_issues".to_string()][..]));
    }
}
