//! YouTube Data API v3 source
//!
//! - fetch: `GET commentThreads?part=snippet&allThreadsRelatedToChannelId=..`
//!   ordered by time, plain text
//! - reply: `POST comments?part=snippet` with `parentId`
//!
//! HTTP 429 and the quota/rate 403 reasons map to `SourceError::RateLimited`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::credentials::Credentials;
use crate::domain::{Platform, RawComment};
use crate::ports::{SourceConnector, SourceError, SourcePort};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// API hard limit for commentThreads.list
const MAX_PAGE_SIZE: u32 = 100;

/// Used when a rate limit response carries no Retry-After
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThreadList {
    #[serde(default)]
    items: Vec<Thread>,
}

#[derive(Debug, Deserialize)]
struct Thread {
    snippet: ThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    video_id: Option<String>,
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_display: String,
    text_original: Option<String>,
    #[serde(default)]
    author_display_name: String,
    author_channel_id: Option<AuthorChannelId>,
    video_id: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorChannelId {
    value: String,
}

fn parse_threads(body: &str) -> Result<Vec<RawComment>, SourceError> {
    let list: ThreadList =
        serde_json::from_str(body).map_err(|e| SourceError::InvalidResponse(format!("commentThreads: {}", e)))?;

    Ok(list
        .items
        .into_iter()
        .map(|thread| {
            let top = thread.snippet.top_level_comment;
            let snippet = top.snippet;
            RawComment {
                external_id: top.id,
                text: snippet.text_original.unwrap_or(snippet.text_display),
                author: snippet.author_display_name,
                author_channel_id: snippet.author_channel_id.map(|a| a.value),
                video_id: snippet.video_id.or(thread.snippet.video_id),
                published_at: snippet
                    .published_at
                    .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                    .map(|dt| dt.timestamp_millis()),
            }
        })
        .collect())
}

/// Map a non-success status and body to a `SourceError`
fn classify_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SourceError {
    let reason = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["errors"][0]["reason"].as_str().map(str::to_string))
        .unwrap_or_default();

    match status.as_u16() {
        429 => SourceError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        },
        403 if matches!(
            reason.as_str(),
            "quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded"
        ) =>
        {
            SourceError::RateLimited {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            }
        }
        401 => SourceError::Unauthorized(body.to_string()),
        code => SourceError::Api {
            status: code,
            message: body.to_string(),
        },
    }
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// A YouTube channel reachable with one OAuth access token
pub struct YoutubeSource {
    client: Client,
    api_base: String,
    access_token: SecretString,
}

impl YoutubeSource {
    async fn check(response: Response) -> Result<String, SourceError> {
        let status = response.status();
        let retry_after = retry_after_header(&response);
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_error(status, retry_after, &body))
        }
    }
}

#[async_trait]
impl SourcePort for YoutubeSource {
    async fn fetch_recent_comments(&self, channel_id: &str, max_results: u32) -> Result<Vec<RawComment>, SourceError> {
        let page_size = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .client
            .get(format!("{}/commentThreads", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .query(&[
                ("part", "snippet"),
                ("allThreadsRelatedToChannelId", channel_id),
                ("maxResults", page_size.as_str()),
                ("order", "time"),
                ("textFormat", "plainText"),
            ])
            .send()
            .await?;

        let body = Self::check(response).await?;
        parse_threads(&body)
    }

    async fn send_reply(&self, external_comment_id: &str, text: &str) -> Result<(), SourceError> {
        let response = self
            .client
            .post(format!("{}/comments", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("part", "snippet")])
            .json(&json!({
                "snippet": {
                    "parentId": external_comment_id,
                    "textOriginal": text,
                }
            }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Builds `YoutubeSource`s sharing one HTTP client
pub struct YoutubeConnector {
    client: Client,
    config: YoutubeConfig,
}

impl YoutubeConnector {
    pub fn new(config: YoutubeConfig) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

impl SourceConnector for YoutubeConnector {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn SourcePort>, SourceError> {
        if credentials.access_token.expose_secret().is_empty() {
            return Err(SourceError::Unauthorized("empty access token".to_string()));
        }
        Ok(Arc::new(YoutubeSource {
            client: self.client.clone(),
            api_base: self.config.api_base.trim_end_matches('/').to_string(),
            access_token: credentials.access_token.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREADS: &str = r#"{
        "kind": "youtube#commentThreadListResponse",
        "items": [
            {
                "id": "thread-1",
                "snippet": {
                    "videoId": "vid-1",
                    "topLevelComment": {
                        "id": "UgxA",
                        "snippet": {
                            "textDisplay": "Great video!",
                            "textOriginal": "Great video!",
                            "authorDisplayName": "Ana",
                            "authorChannelId": { "value": "UCana" },
                            "videoId": "vid-1",
                            "publishedAt": "2026-10-18T12:00:00Z"
                        }
                    }
                }
            },
            {
                "id": "thread-2",
                "snippet": {
                    "videoId": "vid-2",
                    "topLevelComment": {
                        "id": "UgxB",
                        "snippet": {
                            "textDisplay": "when is part 2?",
                            "authorDisplayName": "Bruno"
                        }
                    }
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_threads() {
        let comments = parse_threads(THREADS).unwrap();
        assert_eq!(comments.len(), 2);

        assert_eq!(comments[0].external_id, "UgxA");
        assert_eq!(comments[0].text, "Great video!");
        assert_eq!(comments[0].author_channel_id.as_deref(), Some("UCana"));
        assert!(comments[0].published_at.is_some());

        // Falls back to the thread's video id and the display text
        assert_eq!(comments[1].video_id.as_deref(), Some("vid-2"));
        assert_eq!(comments[1].text, "when is part 2?");
        assert!(comments[1].author_channel_id.is_none());
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_threads(r#"{"kind": "x"}"#).unwrap().is_empty());
        assert!(matches!(
            parse_threads("<html>").unwrap_err(),
            SourceError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_classify_error() {
        let quota = r#"{"error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}}"#;
        assert!(classify_error(StatusCode::FORBIDDEN, None, quota).is_rate_limit());

        let forbidden = r#"{"error": {"code": 403, "errors": [{"reason": "forbidden"}]}}"#;
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, None, forbidden),
            SourceError::Api { status: 403, .. }
        ));

        let limited = classify_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(9)), "");
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(9)));

        assert!(matches!(
            classify_error(StatusCode::UNAUTHORIZED, None, "expired"),
            SourceError::Unauthorized(_)
        ));
        assert!(classify_error(StatusCode::BAD_GATEWAY, None, "").is_retryable());
    }

    #[test]
    fn test_connect_rejects_empty_token() {
        let connector = YoutubeConnector::new(YoutubeConfig::default()).unwrap();
        assert_eq!(connector.platform(), Platform::Youtube);
        assert!(connector.connect(&Credentials::new("", None)).is_err());
        assert!(connector.connect(&Credentials::new("ya29.x", None)).is_ok());
    }
}
