//! The `LlmClient` collaborator: the only point at which a controller
//! reaches outside the process. Transport, auth, and provider selection
//! are entirely the implementor's concern.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ConversationMessage;
use crate::stream::ChunkStream;
use crate::tools::ToolDefinition;

/// Everything a controller knows how to ask for from an LLM call.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub session_id: String,
    pub execution_id: String,
    pub messages: Vec<ConversationMessage>,
    pub provider_spec: String,
    pub backend_id: String,
    /// Present for native-thinking requests (tools bound to the call);
    /// `None` for ReAct and synthesis, which never bind tools.
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Abstract interface for LLM backends. Implement this to add support for
/// a new provider; the controllers never depend on a concrete transport.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issues one generation request and returns its streamed chunks. The
    /// stream is expected to close cleanly on completion or carry an
    /// `Error` chunk (`Chunk::Error`) on failure — not close early with no
    /// signal, which this crate cannot distinguish from an empty answer.
    async fn generate(&self, input: GenerateInput) -> Result<ChunkStream>;
}
