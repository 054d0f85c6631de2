//! `ExecutionContext`: the immutable bundle of identifiers, payload, and
//! collaborator handles a controller run is given.

use std::sync::Arc;

use crate::audit::ServiceBundle;
use crate::config::ResolvedConfig;
use crate::llm::LlmClient;
use crate::prompt::PromptBuilder;
use crate::tools::ToolExecutor;

/// Identifies a parent execution when this run is a sub-agent invocation.
#[derive(Debug, Clone)]
pub struct SubAgent {
    pub parent_execution_id: String,
    pub agent_name: String,
    pub agent_index: u32,
}

/// Everything a controller needs to run, built once by the caller and
/// handed to `Controller::run`. Immutable for the duration of the run;
/// the controller mutates only its own local `IterationState` and message
/// buffer, never this struct.
#[derive(Clone)]
pub struct ExecutionContext {
    pub session_id: String,
    pub stage_id: String,
    pub execution_id: String,
    pub agent_name: String,
    pub agent_index: u32,
    pub sub_agent: Option<SubAgent>,

    pub alert_payload: String,
    pub runbook: String,

    pub config: ResolvedConfig,

    pub llm_client: Arc<dyn LlmClient>,
    pub tool_executor: Arc<dyn ToolExecutor>,
    pub prompt_builder: Arc<dyn PromptBuilder>,
    pub services: Arc<dyn ServiceBundle>,
}

impl ExecutionContext {
    /// Convenience constructor mirroring the field order above; mostly
    /// useful in tests, where every field is usually supplied explicitly
    /// anyway via struct-update syntax on a base instance.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        stage_id: impl Into<String>,
        execution_id: impl Into<String>,
        agent_name: impl Into<String>,
        alert_payload: impl Into<String>,
        runbook: impl Into<String>,
        config: ResolvedConfig,
        llm_client: Arc<dyn LlmClient>,
        tool_executor: Arc<dyn ToolExecutor>,
        prompt_builder: Arc<dyn PromptBuilder>,
        services: Arc<dyn ServiceBundle>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            stage_id: stage_id.into(),
            execution_id: execution_id.into(),
            agent_name: agent_name.into(),
            agent_index: 0,
            sub_agent: None,
            alert_payload: alert_payload.into(),
            runbook: runbook.into(),
            config,
            llm_client,
            tool_executor,
            prompt_builder,
            services,
        }
    }
}
