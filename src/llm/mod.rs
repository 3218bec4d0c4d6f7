//! LLM layer - OpenAI chat completions behind the classifier and responder ports
//!
//! This module provides:
//! - Chat request/response types and `LlmError`
//! - Prompt builders for classification and reply drafting
//! - `OpenAiClient`, which implements both `ClassifierPort` and `ResponderPort`

pub mod client;
pub mod openai;
pub mod prompts;

pub use client::{ChatCompletion, ChatRequest, LlmError};
pub use openai::{OpenAiClient, OpenAiConfig};
