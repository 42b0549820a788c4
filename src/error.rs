//! Error types for the portfolio agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// The LLM provider is rate-limited, unreachable or returning 5xx.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Verification error: {0}")]
    VerificationError(String),

    #[error("Conversation store error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Stable name of the variant, used by the error categorizer.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::LlmUnavailable(_) => "LlmUnavailable",
            OrchestrationError::LlmError(_) => "LlmError",
            OrchestrationError::InvalidInput(_) => "InvalidInput",
            OrchestrationError::ToolError(_) => "ToolError",
            OrchestrationError::VerificationError(_) => "VerificationError",
            OrchestrationError::StoreError(_) => "StoreError",
            OrchestrationError::DatabaseError(_) => "DatabaseError",
            OrchestrationError::ConfigError(_) => "ConfigError",
            OrchestrationError::Unknown(_) => "Unknown",
            OrchestrationError::SerializationError(_) => "SerializationError",
            OrchestrationError::HttpError(_) => "HttpError",
            OrchestrationError::SqlError(_) => "SqlError",
            OrchestrationError::IoError(_) => "IoError",
        }
    }
}
