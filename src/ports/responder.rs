//! Reply generation capability

use crate::domain::{Category, Policy, Tone};
use crate::llm::LlmError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Everything a responder needs to draft one reply
#[derive(Debug, Clone)]
pub struct ReplyRequest<'a> {
    pub text: &'a str,
    pub category: Category,
    pub persona: &'a str,
    pub tone: Tone,
    pub custom_instruction: Option<&'a str>,
    pub language: &'a str,
}

impl<'a> ReplyRequest<'a> {
    pub fn new(text: &'a str, category: Category, policy: &'a Policy) -> Self {
        Self {
            text,
            category,
            persona: &policy.persona_name,
            tone: policy.tone,
            custom_instruction: policy.custom_instruction.as_deref(),
            language: &policy.language,
        }
    }
}

/// A generated reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub model: String,
    pub tokens_used: u32,
}

/// Drafts replies.
///
/// Must return `Ok(None)` for any category where `Category::is_unsafe` holds,
/// and may decline other comments the same way.
#[async_trait]
pub trait ResponderPort: Send + Sync {
    async fn generate_reply(&self, request: &ReplyRequest<'_>) -> Result<Option<Reply>, LlmError>;
}

/// Canned responder for tests
pub struct MockResponder {
    text: String,
    fail: bool,
    decline: bool,
    calls: AtomicUsize,
}

impl Default for MockResponder {
    fn default() -> Self {
        Self {
            text: "Thanks for the comment!".to_string(),
            fail: false,
            decline: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Every call returns an API error
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every call returns no reply
    pub fn declining(mut self) -> Self {
        self.decline = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponderPort for MockResponder {
    async fn generate_reply(&self, request: &ReplyRequest<'_>) -> Result<Option<Reply>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.category.is_unsafe() || self.decline {
            return Ok(None);
        }
        if self.fail {
            return Err(LlmError::ApiError {
                status: 500,
                message: "mock failure".to_string(),
            });
        }
        Ok(Some(Reply {
            text: self.text.clone(),
            model: "mock-model".to_string(),
            tokens_used: 10,
        }))
    }
}
