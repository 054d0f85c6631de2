//! `sqlx`/Postgres implementation of the audit service-bundle traits.
//!
//! One struct wrapping a pool, one method per operation, the usual
//! bind-chain `query`/`query_as` idiom with `?` propagation into
//! `crate::error::Error::Database`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use crate::audit::types::{LlmInteraction, McpInteraction, PersistedMessage, TimelineEvent, TimelineEventStatus};
use crate::audit::{InteractionService, MessageService, ServiceBundle, StageService, TimelineService};
use crate::error::Result;

/// Postgres connection pool type alias.
pub type PostgresPool = PgPool;

/// Opens a pool against `database_url`, verifying connectivity eagerly.
pub async fn init_pool(database_url: &str, max_connections: u32, connect_timeout_secs: u64) -> Result<PostgresPool> {
    info!("initializing PostgreSQL connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(connect_timeout_secs))
        .connect(database_url)
        .await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

/// Creates the tables this adapter reads and writes, if they don't exist.
pub async fn run_migrations(pool: &PostgresPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_messages (
            id BIGSERIAL PRIMARY KEY,
            execution_id TEXT NOT NULL,
            sequence_number BIGINT NOT NULL,
            message JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timeline_events (
            id BIGSERIAL PRIMARY KEY,
            execution_id TEXT NOT NULL,
            sequence_number BIGINT NOT NULL,
            event_type TEXT NOT NULL,
            status TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS llm_interactions (
            id BIGSERIAL PRIMARY KEY,
            execution_id TEXT NOT NULL,
            iteration INTEGER NOT NULL,
            interaction_type TEXT NOT NULL,
            messages_sent_count INTEGER NOT NULL,
            response_text TEXT NOT NULL,
            response_thinking TEXT NOT NULL,
            token_usage JSONB,
            duration_ms BIGINT NOT NULL,
            last_message_id TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mcp_interactions (
            id BIGSERIAL PRIMARY KEY,
            execution_id TEXT NOT NULL,
            server_name TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            interaction_type TEXT NOT NULL,
            tool_arguments JSONB NOT NULL,
            tool_result JSONB NOT NULL,
            duration_ms BIGINT NOT NULL,
            error_message TEXT,
            available_tools JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_execution_messages_execution_id ON execution_messages(execution_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_timeline_events_execution_id ON timeline_events(execution_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_llm_interactions_execution_id ON llm_interactions(execution_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mcp_interactions_execution_id ON mcp_interactions(execution_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Backs all four narrow service-bundle traits with one pool. Stage lookups
/// read whatever row the embedding application's own stage table wrote;
/// this adapter only knows the column shape it needs.
#[derive(Clone)]
pub struct PostgresServiceBundle {
    pool: PostgresPool,
}

impl PostgresServiceBundle {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageService for PostgresServiceBundle {
    async fn store_message(&self, message: PersistedMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_messages (execution_id, sequence_number, message)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&message.execution_id)
        .bind(message.sequence_number)
        .bind(serde_json::to_value(&message.message)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TimelineService for PostgresServiceBundle {
    async fn create_event(&self, event: TimelineEvent) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO timeline_events (execution_id, sequence_number, event_type, status, content, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&event.execution_id)
        .bind(event.sequence_number)
        .bind(serde_json::to_value(event.event_type)?.as_str().unwrap_or_default().to_string())
        .bind(status_str(event.status))
        .bind(&event.content)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn complete_event(&self, event_id: i64, content: String, metadata: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE timeline_events
            SET status = $2, content = $3, metadata = $4
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(status_str(TimelineEventStatus::Completed))
        .bind(content)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InteractionService for PostgresServiceBundle {
    async fn record_llm_interaction(&self, interaction: LlmInteraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO llm_interactions (
                execution_id, iteration, interaction_type, messages_sent_count,
                response_text, response_thinking, token_usage, duration_ms, last_message_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&interaction.execution_id)
        .bind(interaction.iteration as i32)
        .bind(serde_json::to_value(interaction.interaction_type)?.as_str().unwrap_or_default().to_string())
        .bind(interaction.messages_sent_count as i32)
        .bind(&interaction.response_text)
        .bind(&interaction.response_thinking)
        .bind(interaction.token_usage.as_ref().map(serde_json::to_value).transpose()?)
        .bind(interaction.duration_ms as i64)
        .bind(&interaction.last_message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_mcp_interaction(&self, interaction: McpInteraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mcp_interactions (
                execution_id, server_name, tool_name, interaction_type,
                tool_arguments, tool_result, duration_ms, error_message, available_tools
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&interaction.execution_id)
        .bind(&interaction.server_name)
        .bind(&interaction.tool_name)
        .bind(serde_json::to_value(interaction.interaction_type)?.as_str().unwrap_or_default().to_string())
        .bind(&interaction.tool_arguments)
        .bind(&interaction.tool_result)
        .bind(interaction.duration_ms as i64)
        .bind(&interaction.error_message)
        .bind(interaction.available_tools.as_ref().map(serde_json::to_value).transpose()?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StageService for PostgresServiceBundle {
    /// Reads the `final_analysis` timeline event of the most recent
    /// execution that ran for `stage_id`, if any.
    async fn previous_stage_context(&self, stage_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT te.content
            FROM timeline_events te
            JOIN executions e ON e.execution_id = te.execution_id
            WHERE e.stage_id = $1
              AND te.event_type = 'final_analysis'
            ORDER BY te.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(stage_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(content,)| content))
    }
}

impl ServiceBundle for PostgresServiceBundle {
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

fn status_str(status: TimelineEventStatus) -> String {
    match status {
        TimelineEventStatus::Streaming => "streaming".to_string(),
        TimelineEventStatus::Completed => "completed".to_string(),
    }
}
