//! Chat completion types and the LLM error taxonomy

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One single-turn chat request. Each call is independent; no history is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens: 150,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Text and accounting returned by a chat call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub total_tokens: u32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::JsonError(_) => false,
            LlmError::MissingApiKey { .. } => false,
            LlmError::Timeout(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_builder() {
        let req = ChatRequest::new("sys", "user").with_temperature(0.7).with_max_tokens(20);
        assert_eq!(req.system, "sys");
        assert_eq!(req.max_tokens, 20);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_error_retryable() {
        assert!(LlmError::RateLimited {
            retry_after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(LlmError::ApiError {
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::ApiError {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::MissingApiKey {
            env_var: "OPENAI_API_KEY".into()
        }
        .is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LlmError::MissingApiKey {
            env_var: "OPENAI_API_KEY".into(),
        };
        assert_eq!(
            err.to_string(),
            "Missing API key: environment variable OPENAI_API_KEY not set"
        );
    }
}
