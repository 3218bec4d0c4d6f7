//! Comments and their canonical category
//!
//! `Category` is the single classification vocabulary shared by the classifier,
//! the policy filter and the responder. `Category::is_unsafe` is the one place
//! that decides which categories may never receive a generated reply.

use crate::id::{generate_comment_id, now_ms};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical comment categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Praise,
    Question,
    Criticism,
    Disagreement,
    Offensive,
    Spam,
    Neutral,
    ContentRequest,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Praise,
        Category::Question,
        Category::Criticism,
        Category::Disagreement,
        Category::Offensive,
        Category::Spam,
        Category::Neutral,
        Category::ContentRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Praise => "praise",
            Category::Question => "question",
            Category::Criticism => "criticism",
            Category::Disagreement => "disagreement",
            Category::Offensive => "offensive",
            Category::Spam => "spam",
            Category::Neutral => "neutral",
            Category::ContentRequest => "content_request",
        }
    }

    /// Parse a free-form label as produced by a model or a legacy record.
    ///
    /// Accepts the canonical names and the Portuguese labels earlier data used
    /// (`elogio`, `duvida`, `critica`, ...). Surrounding whitespace, case and
    /// trailing punctuation are ignored.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase()
            .replace([' ', '-'], "_");

        match cleaned.as_str() {
            "praise" | "elogio" => Some(Category::Praise),
            "question" | "duvida" | "dúvida" => Some(Category::Question),
            "criticism" | "critica" | "crítica" => Some(Category::Criticism),
            "disagreement" | "discordancia" | "discordância" => Some(Category::Disagreement),
            "offensive" | "ofensa" => Some(Category::Offensive),
            "spam" => Some(Category::Spam),
            "neutral" | "neutro" => Some(Category::Neutral),
            "content_request" | "pedido_de_conteudo" | "pedido_de_conteúdo" => {
                Some(Category::ContentRequest)
            }
            _ => None,
        }
    }

    /// Categories that must never receive a generated reply, regardless of policy
    pub fn is_unsafe(&self) -> bool {
        matches!(self, Category::Spam | Category::Offensive)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comment as returned by a source, before anything is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawComment {
    /// Platform-native comment id; globally unique dedup key
    pub external_id: String,
    pub text: String,
    pub author: String,
    pub author_channel_id: Option<String>,
    pub video_id: Option<String>,
    pub published_at: Option<i64>,
}

impl RawComment {
    pub fn new(external_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            text: text.into(),
            author: String::new(),
            author_channel_id: None,
            video_id: None,
            published_at: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

/// A persisted comment. Written once and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub integration_id: String,
    pub external_id: String,
    pub author: String,
    pub author_channel_id: Option<String>,
    pub text: String,
    pub category: Option<Category>,
    pub video_id: Option<String>,
    pub received_at: i64,
}

impl Comment {
    pub fn from_raw(integration_id: &str, raw: &RawComment, category: Option<Category>) -> Self {
        Self {
            id: generate_comment_id(),
            integration_id: integration_id.to_string(),
            external_id: raw.external_id.clone(),
            author: raw.author.clone(),
            author_channel_id: raw.author_channel_id.clone(),
            text: raw.text.clone(),
            category,
            video_id: raw.video_id.clone(),
            received_at: raw.published_at.unwrap_or_else(now_ms),
        }
    }
}
