//! OpenAI chat completions client
//!
//! Implements both `ClassifierPort` and `ResponderPort` on top of one HTTP
//! client. The API key is held as a `SecretString` and only exposed when the
//! Authorization header is built.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::domain::Category;
use crate::llm::client::{ChatCompletion, ChatRequest, LlmError};
use crate::llm::prompts;
use crate::ports::{ClassifierPort, Reply, ReplyRequest, ResponderPort};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub classify_max_tokens: u32,
    pub reply_max_tokens: u32,
    pub reply_temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
            classify_max_tokens: 20,
            reply_max_tokens: 150,
            reply_temperature: 0.7,
        }
    }
}

pub struct OpenAiClient {
    client: Client,
    api_key: SecretString,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Reads OPENAI_API_KEY from the environment
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| LlmError::MissingApiKey {
            env_var: API_KEY_ENV.to_string(),
        })?;
        Self::with_api_key(SecretString::from(api_key), config)
    }

    pub fn with_api_key(api_key: SecretString, config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        json!({
            "model": self.config.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        })
    }

    fn parse_completion(&self, body: &Value) -> Result<ChatCompletion, LlmError> {
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))?;

        Ok(ChatCompletion {
            content: content.to_string(),
            model: body["model"].as_str().unwrap_or(&self.config.model).to_string(),
            total_tokens: body["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }

    /// One chat completion round trip
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(20);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        self.parse_completion(&body)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[async_trait]
impl ClassifierPort for OpenAiClient {
    async fn classify(&self, text: &str) -> Category {
        let request = ChatRequest::new(prompts::CLASSIFIER_SYSTEM, prompts::classification_prompt(text))
            .with_temperature(0.0)
            .with_max_tokens(self.config.classify_max_tokens);

        match self.chat(&request).await {
            Ok(completion) => Category::from_label(&completion.content).unwrap_or_else(|| {
                log::debug!("Unrecognized category label {:?}, using neutral", completion.content);
                Category::Neutral
            }),
            Err(e) => {
                log::warn!("Classification failed, using neutral: {}", e);
                Category::Neutral
            }
        }
    }
}

#[async_trait]
impl ResponderPort for OpenAiClient {
    async fn generate_reply(&self, request: &ReplyRequest<'_>) -> Result<Option<Reply>, LlmError> {
        if request.category.is_unsafe() {
            return Ok(None);
        }

        let chat = ChatRequest::new(prompts::reply_system_prompt(request), prompts::reply_user_prompt(request))
            .with_temperature(self.config.reply_temperature)
            .with_max_tokens(self.config.reply_max_tokens);

        let completion = self.chat(&chat).await?;
        let text = prompts::clean_reply(&completion.content);
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(Reply {
            text,
            model: completion.model,
            tokens_used: completion.total_tokens,
        }))
    }
}
