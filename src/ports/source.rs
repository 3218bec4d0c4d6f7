//! Comment source capability

use crate::credentials::Credentials;
use crate::domain::{Platform, RawComment};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors from a social platform
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Authorization rejected: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::RateLimited { .. } => true,
            SourceError::Api { status, .. } => *status >= 500,
            SourceError::Network(_) => true,
            SourceError::Unauthorized(_) => false,
            SourceError::InvalidResponse(_) => false,
        }
    }
}

/// A connected, credentialed view of one platform account
#[async_trait]
pub trait SourcePort: Send + Sync {
    /// Most recent comments on the channel, newest first, at most `max_results`
    async fn fetch_recent_comments(&self, channel_id: &str, max_results: u32) -> Result<Vec<RawComment>, SourceError>;

    /// Post `text` as a reply to the given comment
    async fn send_reply(&self, external_comment_id: &str, text: &str) -> Result<(), SourceError>;
}

/// Builds a `SourcePort` for one platform from decrypted credentials
pub trait SourceConnector: Send + Sync {
    fn platform(&self) -> Platform;

    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn SourcePort>, SourceError>;
}

/// In-memory source for tests
#[derive(Default)]
pub struct MockSource {
    comments: Mutex<Vec<RawComment>>,
    fetch_error: Option<String>,
    failing_sends: HashSet<String>,
    rate_limited_sends: HashSet<String>,
    send_delay: Option<Duration>,
    fetch_calls: AtomicUsize,
    send_calls: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comments(self, comments: Vec<RawComment>) -> Self {
        self.set_comments(comments);
        self
    }

    /// Every fetch fails with an upstream 500
    pub fn with_fetch_error(mut self, message: &str) -> Self {
        self.fetch_error = Some(message.to_string());
        self
    }

    /// Replies to this comment fail with an upstream 500
    pub fn with_failing_send(mut self, external_id: &str) -> Self {
        self.failing_sends.insert(external_id.to_string());
        self
    }

    /// Replies to this comment are rejected with a rate limit
    pub fn with_rate_limited_send(mut self, external_id: &str) -> Self {
        self.rate_limited_sends.insert(external_id.to_string());
        self
    }

    /// Each send sleeps this long before succeeding
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Replace what the upstream currently returns
    pub fn set_comments(&self, comments: Vec<RawComment>) {
        let mut guard = self.comments.lock().unwrap_or_else(|e| e.into_inner());
        *guard = comments;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Send attempts, including failed ones
    pub fn send_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Successfully delivered replies as (external comment id, text)
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SourcePort for MockSource {
    async fn fetch_recent_comments(&self, _channel_id: &str, max_results: u32) -> Result<Vec<RawComment>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fetch_error {
            return Err(SourceError::Api {
                status: 500,
                message: message.clone(),
            });
        }
        let comments = self.comments.lock().unwrap_or_else(|e| e.into_inner());
        Ok(comments.iter().take(max_results as usize).cloned().collect())
    }

    async fn send_reply(&self, external_comment_id: &str, text: &str) -> Result<(), SourceError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.rate_limited_sends.contains(external_comment_id) {
            return Err(SourceError::RateLimited {
                retry_after: Duration::from_secs(1),
            });
        }
        if self.failing_sends.contains(external_comment_id) {
            return Err(SourceError::Api {
                status: 500,
                message: format!("cannot reply to {}", external_comment_id),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((external_comment_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Connector that always hands out the same `MockSource`
pub struct MockSourceConnector {
    platform: Platform,
    source: Arc<MockSource>,
}

impl MockSourceConnector {
    pub fn new(platform: Platform, source: Arc<MockSource>) -> Self {
        Self { platform, source }
    }
}

impl SourceConnector for MockSourceConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn connect(&self, _credentials: &Credentials) -> Result<Arc<dyn SourcePort>, SourceError> {
        let source: Arc<dyn SourcePort> = self.source.clone();
        Ok(source)
    }
}
