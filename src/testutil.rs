//! Hand-rolled in-memory fakes for the crate's own test suite, shared
//! across multiple controllers' test modules. Plain structs, direct
//! assertions, no mocking framework.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audit::{
    InteractionService, LlmInteraction, McpInteraction, MessageService, PersistedMessage,
    ServiceBundle, StageService, TimelineEvent, TimelineEventStatus, TimelineService,
};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::llm::{GenerateInput, LlmClient};
use crate::message::{ConversationMessage, ToolCall};
use crate::prompt::PromptBuilder;
use crate::stream::{Chunk, ChunkStream};
use crate::tools::{ToolDefinition, ToolExecutor, ToolResult};

/// Drives canned chunk-stream replies in order. Each `.generate()` call
/// pops the next queued reply; calling it more times than queued panics,
/// which is the point — it surfaces a test author's miscount immediately.
#[derive(Default)]
pub struct FakeLlmClient {
    replies: Mutex<VecDeque<FakeReply>>,
    /// Every `GenerateInput` this client has seen, in call order. Lets a
    /// test inspect what was actually sent to the LLM (e.g. bound tool
    /// names) without threading a separate capture channel through.
    pub seen_inputs: Mutex<Vec<GenerateInput>>,
}

pub enum FakeReply {
    Chunks(Vec<Chunk>),
    Error(Error),
}

impl FakeLlmClient {
    pub fn new(replies: Vec<FakeReply>) -> Self {
        Self { replies: Mutex::new(replies.into()), seen_inputs: Mutex::new(Vec::new()) }
    }

    /// Convenience for a reply that is just a closing text chunk.
    pub fn text_reply(text: impl Into<String>) -> FakeReply {
        FakeReply::Chunks(vec![Chunk::Text(text.into())])
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn generate(&self, input: GenerateInput) -> Result<ChunkStream> {
        self.seen_inputs.lock().unwrap().push(input);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("FakeLlmClient ran out of queued replies");
        match reply {
            FakeReply::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(chunks))),
            FakeReply::Error(err) => Err(err),
        }
    }
}

/// Dispatches tool calls against a fixed name -> result map. Arguments are
/// ignored; tests needing argument-sensitive behaviour should key distinct
/// tool names per scenario instead.
#[derive(Default)]
pub struct FakeToolExecutor {
    definitions: Vec<ToolDefinition>,
    results: HashMap<String, ToolResult>,
}

impl FakeToolExecutor {
    pub fn new(definitions: Vec<ToolDefinition>, results: HashMap<String, ToolResult>) -> Self {
        Self { definitions, results }
    }
}

#[async_trait]
impl ToolExecutor for FakeToolExecutor {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self.definitions.clone())
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        self.results
            .get(&call.name)
            .cloned()
            .ok_or_else(|| Error::Tool(format!("no fake result registered for {}", call.name)))
    }
}

/// Returns fixed message lists regardless of context, for controllers
/// whose tests only care about the loop mechanics, not prompt content.
pub struct FakePromptBuilder {
    pub react_messages: Vec<ConversationMessage>,
    pub native_thinking_messages: Vec<ConversationMessage>,
    pub synthesis_messages: Vec<ConversationMessage>,
}

impl Default for FakePromptBuilder {
    fn default() -> Self {
        Self {
            react_messages: vec![ConversationMessage::system("you are an SRE agent")],
            native_thinking_messages: vec![ConversationMessage::system("you are an SRE agent")],
            synthesis_messages: vec![ConversationMessage::system("you are an SRE agent")],
        }
    }
}

#[async_trait]
impl PromptBuilder for FakePromptBuilder {
    async fn build_react_messages(
        &self,
        _ctx: &ExecutionContext,
        _prev_stage_context: Option<&str>,
    ) -> Result<Vec<ConversationMessage>> {
        Ok(self.react_messages.clone())
    }

    async fn build_native_thinking_messages(
        &self,
        _ctx: &ExecutionContext,
        _prev_stage_context: Option<&str>,
    ) -> Result<Vec<ConversationMessage>> {
        Ok(self.native_thinking_messages.clone())
    }

    async fn build_synthesis_messages(
        &self,
        _ctx: &ExecutionContext,
        _prev_stage_context: Option<&str>,
    ) -> Result<Vec<ConversationMessage>> {
        Ok(self.synthesis_messages.clone())
    }
}

/// Records everything written through the service-bundle traits in
/// `Vec`s/`HashMap`s behind a `Mutex`, so assertions can inspect them
/// directly after a controller run.
#[derive(Default)]
pub struct InMemoryServiceBundle {
    pub messages: Mutex<Vec<PersistedMessage>>,
    pub timeline: Mutex<Vec<TimelineEvent>>,
    pub llm_interactions: Mutex<Vec<LlmInteraction>>,
    pub mcp_interactions: Mutex<Vec<McpInteraction>>,
    pub previous_stage_context: Option<String>,
}

#[async_trait]
impl MessageService for InMemoryServiceBundle {
    async fn store_message(&self, message: PersistedMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl TimelineService for InMemoryServiceBundle {
    async fn create_event(&self, event: TimelineEvent) -> Result<i64> {
        let mut events = self.timeline.lock().unwrap();
        let id = events.len() as i64;
        events.push(event);
        Ok(id)
    }

    async fn complete_event(&self, event_id: i64, content: String, metadata: serde_json::Value) -> Result<()> {
        let mut events = self.timeline.lock().unwrap();
        let event = events
            .get_mut(event_id as usize)
            .ok_or_else(|| Error::Internal(format!("no timeline event with id {event_id}")))?;
        event.content = content;
        event.metadata = metadata;
        event.status = TimelineEventStatus::Completed;
        Ok(())
    }
}

#[async_trait]
impl InteractionService for InMemoryServiceBundle {
    async fn record_llm_interaction(&self, interaction: LlmInteraction) -> Result<()> {
        self.llm_interactions.lock().unwrap().push(interaction);
        Ok(())
    }

    async fn record_mcp_interaction(&self, interaction: McpInteraction) -> Result<()> {
        self.mcp_interactions.lock().unwrap().push(interaction);
        Ok(())
    }
}

#[async_trait]
impl StageService for InMemoryServiceBundle {
    async fn previous_stage_context(&self, _stage_id: &str) -> Result<Option<String>> {
        Ok(self.previous_stage_context.clone())
    }
}

impl ServiceBundle for InMemoryServiceBundle {
    fn messages(&self) -> &dyn MessageService {
        self
    }

    fn timeline(&self) -> &dyn TimelineService {
        self
    }

    fn interactions(&self) -> &dyn InteractionService {
        self
    }

    fn stages(&self) -> &dyn StageService {
        self
    }
}
