//! Draining a streamed LLM response into one typed [`LlmResponse`].

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::ToolCall;

/// Token accounting reported by the provider on (at least) the final chunk
/// of a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub thinking_tokens: u32,
}

impl TokenUsage {
    /// Folds `other` into `self`. Used to accumulate usage across every
    /// LLM call in a run — iteration calls, the summarization call, and
    /// the forced-conclusion call alike.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.thinking_tokens += other.thinking_tokens;
    }
}

/// One code-execution round trip surfaced by a native-thinking provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExecution {
    pub code: String,
    pub result: String,
}

/// A grounding/citation round trip surfaced by a native-thinking provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Grounding {
    pub web_search_queries: Vec<String>,
    pub sources: Vec<String>,
    pub supports: Vec<String>,
}

/// One unit of a streamed LLM response. The LLM client collaborator yields
/// a stream of these; the crate never receives a non-streaming response.
#[derive(Debug, Clone)]
pub enum Chunk {
    Text(String),
    Thinking(String),
    ToolCall { call_id: String, name: String, arguments: String },
    Usage(TokenUsage),
    CodeExecution(CodeExecution),
    Grounding(Grounding),
    Error { message: String, code: Option<String>, retryable: bool },
}

/// Stream of chunks returned by `LlmClient::generate`.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Chunk> + Send>>;

/// The fully drained result of one LLM call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub thinking_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    pub code_executions: Vec<CodeExecution>,
    pub groundings: Vec<Grounding>,
}

/// Tracks, per chunk category, whether that category appeared at least
/// once while `collect_with_audit` drained the stream.
///
/// The native-thinking controller uses this to gate its own timeline-event
/// emission: a category that never showed up in the stream has nothing to
/// materialise, so the corresponding `llm_thinking`/`llm_response` event is
/// suppressed rather than emitted empty.
#[derive(Debug, Clone, Default)]
pub struct StreamingAuditState {
    pub text_emitted: bool,
    pub thinking_emitted: bool,
    pub tool_call_emitted: bool,
    pub code_execution_emitted: bool,
    pub grounding_emitted: bool,
}

async fn collect_inner(mut stream: ChunkStream) -> Result<(LlmResponse, StreamingAuditState)> {
    let mut response = LlmResponse::default();
    let mut audit = StreamingAuditState::default();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Chunk::Text(text) => {
                response.text.push_str(&text);
                audit.text_emitted = true;
            }
            Chunk::Thinking(text) => {
                response.thinking_text.push_str(&text);
                audit.thinking_emitted = true;
            }
            Chunk::ToolCall { call_id, name, arguments } => {
                response.tool_calls.push(ToolCall { id: call_id, name, arguments });
                audit.tool_call_emitted = true;
            }
            Chunk::Usage(usage) => response.usage = Some(usage),
            Chunk::CodeExecution(exec) => {
                response.code_executions.push(exec);
                audit.code_execution_emitted = true;
            }
            Chunk::Grounding(grounding) => {
                response.groundings.push(grounding);
                audit.grounding_emitted = true;
            }
            Chunk::Error { message, code, retryable } => {
                return Err(Error::Stream(format!(
                    "{message} (code: {code}, retryable: {retryable})",
                    code = code.as_deref().unwrap_or("none"),
                )));
            }
        }
    }

    Ok((response, audit))
}

/// Drains `stream` into an [`LlmResponse`].
///
/// An `ErrorChunk` aborts the drain immediately: whatever was collected so
/// far is discarded and `Err(Error::Stream(..))` is returned. An empty
/// stream yields a default, all-empty response.
pub async fn collect(stream: ChunkStream) -> Result<LlmResponse> {
    collect_inner(stream).await.map(|(response, _)| response)
}

/// Like [`collect`], but also returns the [`StreamingAuditState`] recording
/// which chunk categories appeared during the drain.
pub async fn collect_with_audit(stream: ChunkStream) -> Result<(LlmResponse, StreamingAuditState)> {
    collect_inner(stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn boxed(chunks: Vec<Chunk>) -> ChunkStream {
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn empty_stream_yields_default_response() {
        let response = collect(boxed(vec![])).await.unwrap();
        assert_eq!(response.text, "");
        assert!(response.tool_calls.is_empty());
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn concatenates_text_and_thinking_in_order() {
        let chunks = vec![
            Chunk::Text("Hello, ".into()),
            Chunk::Thinking("pondering...".into()),
            Chunk::Text("world.".into()),
        ];
        let response = collect(boxed(chunks)).await.unwrap();
        assert_eq!(response.text, "Hello, world.");
        assert_eq!(response.thinking_text, "pondering...");
    }

    #[tokio::test]
    async fn preserves_tool_call_order() {
        let chunks = vec![
            Chunk::ToolCall { call_id: "1".into(), name: "a.b".into(), arguments: "{}".into() },
            Chunk::ToolCall { call_id: "2".into(), name: "c.d".into(), arguments: "{}".into() },
        ];
        let response = collect(boxed(chunks)).await.unwrap();
        assert_eq!(response.tool_calls[0].id, "1");
        assert_eq!(response.tool_calls[1].id, "2");
    }

    #[tokio::test]
    async fn last_usage_chunk_wins() {
        let chunks = vec![
            Chunk::Usage(TokenUsage { total_tokens: 10, ..Default::default() }),
            Chunk::Usage(TokenUsage { total_tokens: 42, ..Default::default() }),
        ];
        let response = collect(boxed(chunks)).await.unwrap();
        assert_eq!(response.usage.unwrap().total_tokens, 42);
    }

    #[tokio::test]
    async fn audit_state_flags_only_categories_seen_in_the_stream() {
        let chunks = vec![
            Chunk::Text("I'll check the pods.".into()),
            Chunk::ToolCall { call_id: "1".into(), name: "k8s.get_pods".into(), arguments: "{}".into() },
        ];
        let (response, audit) = collect_with_audit(boxed(chunks)).await.unwrap();
        assert_eq!(response.text, "I'll check the pods.");
        assert!(audit.text_emitted);
        assert!(audit.tool_call_emitted);
        assert!(!audit.thinking_emitted);
        assert!(!audit.code_execution_emitted);
        assert!(!audit.grounding_emitted);
    }

    #[tokio::test]
    async fn error_chunk_aborts_and_discards_partial_state() {
        let chunks = vec![
            Chunk::Text("partial".into()),
            Chunk::Error { message: "upstream closed".into(), code: Some("502".into()), retryable: true },
        ];
        let err = collect(boxed(chunks)).await.unwrap_err();
        match err {
            Error::Stream(msg) => {
                assert!(msg.contains("upstream closed"));
                assert!(msg.contains("502"));
                assert!(msg.contains("true"));
            }
            other => panic!("expected Error::Stream, got {other:?}"),
        }
    }
}
