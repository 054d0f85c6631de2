//! Error types for the crate.

use thiserror::Error;

/// Result type alias using the crate's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed `ExecutionContext`/`ResolvedConfig` data.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An `IterationStrategy` string that doesn't match a known variant.
    #[error("Unknown iteration strategy: {0}")]
    UnknownStrategy(String),

    /// Per-iteration deadline exceeded.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The LLM client returned a transport-level failure or closed the
    /// stream without a well-formed response.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The chunk stream ended with an `ErrorChunk`.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The tool executor failed to dispatch or run a tool call.
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// A persisted entity could not be written or read back.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Reference persistence adapter's backing store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error, for invariants that should not be reachable.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classifies whether this error should count against the
    /// consecutive-timeout counter (`IterationState::record_failure`).
    ///
    /// Collaborators surface timeouts in different shapes (a dedicated
    /// variant here, or a message mentioning "timeout" from an external
    /// transport) so classification is by variant first, then by message.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Llm(msg) | Error::Stream(msg) | Error::Tool(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timeout") || lower.contains("timed out")
            }
            _ => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(elapsed: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(elapsed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_variant_is_timeout() {
        assert!(Error::Timeout("deadline exceeded".into()).is_timeout());
    }

    #[test]
    fn llm_error_mentioning_timeout_is_timeout() {
        assert!(Error::Llm("request timed out after 30s".into()).is_timeout());
    }

    #[test]
    fn tool_error_is_not_timeout() {
        assert!(!Error::Tool("tool not found".into()).is_timeout());
    }
}
