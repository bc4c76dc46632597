//! Error types for the household ledger agent

use crate::models::ErrorKind;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Pipeline-fatal failures.
///
/// Validation and execution problems are not represented here; those are
/// recorded on the request state as a [`crate::models::PipelineError`] and
/// drive the engine's retry/continue decisions instead.
#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Graph store error: {0}")]
    GraphError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("History store error: {0}")]
    HistoryError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Position of this failure in the pipeline error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::LlmError(_) | OrchestrationError::HttpError(_) => {
                ErrorKind::UpstreamFailure
            }
            OrchestrationError::SerializationError(_) => ErrorKind::ParseFailure,
            OrchestrationError::DatabaseError(_)
            | OrchestrationError::GraphError(_)
            | OrchestrationError::SqlError(_) => ErrorKind::ExecError,
            _ => ErrorKind::UpstreamFailure,
        }
    }
}
