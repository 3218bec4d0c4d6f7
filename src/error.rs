//! Error types for Replyr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;
use crate::ports::SourceError;

/// All error types that can occur in Replyr
#[derive(Debug, Error)]
pub enum ReplyrError {
    /// Integration missing or soft-deleted
    #[error("Integration not found: {0}")]
    IntegrationNotFound(String),

    /// Response missing
    #[error("Response not found: {0}")]
    ResponseNotFound(String),

    /// Comment missing
    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    /// Run task missing
    #[error("Run task not found: {0}")]
    TaskNotFound(String),

    /// Response lifecycle violation
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Unique constraint violation (duplicate enabled integration, etc.)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed, missing or undecryptable credentials
    #[error("Credential error: {0}")]
    Credentials(String),

    /// A send would exceed a plan or policy cap
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Platform has no registered source connector
    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Upstream social platform error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// LLM API error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReplyrError {
    /// Errors that will not go away by retrying the same run.
    pub fn is_fatal_input(&self) -> bool {
        matches!(self, ReplyrError::Credentials(_) | ReplyrError::PlatformNotSupported(_))
    }
}

/// Result type alias for Replyr operations
pub type Result<T> = std::result::Result<T, ReplyrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integration_not_found_error() {
        let err = ReplyrError::IntegrationNotFound("int-1".to_string());
        assert_eq!(err.to_string(), "Integration not found: int-1");
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = ReplyrError::InvalidTransition {
            from: "sent".to_string(),
            to: "pending".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid transition: sent -> pending");
    }

    #[test]
    fn test_credentials_error_is_fatal() {
        let err = ReplyrError::Credentials("bad hex".to_string());
        assert!(err.is_fatal_input());
        assert!(!ReplyrError::Storage("locked".to_string()).is_fatal_input());
    }

    #[test]
    fn test_quota_exceeded_error() {
        let err = ReplyrError::QuotaExceeded("hourly_limit_reached".to_string());
        assert_eq!(err.to_string(), "Quota exceeded: hourly_limit_reached");
        assert!(!err.is_fatal_input());
    }

    #[test]
    fn test_source_error_conversion() {
        let err: ReplyrError = SourceError::InvalidResponse("no items".to_string()).into();
        assert!(matches!(err, ReplyrError::Source(_)));
        assert!(err.to_string().contains("no items"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ReplyrError = json_err.into();
        assert!(matches!(err, ReplyrError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(ReplyrError::Conflict("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
