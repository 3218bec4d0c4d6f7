//! Response records and their lifecycle
//!
//! ```text
//! skipped   (terminal, created by a category skip)
//! pending  -> sending -> sent | failed
//!          -> rejected
//! sending  -> sent | failed
//! ```
//!
//! `sending` is the in-flight marker written before a send call so that a
//! crash between the call and the commit can be resolved to `failed` later
//! instead of being sent twice. Nothing ever returns to `pending`.

use crate::error::{ReplyrError, Result};
use crate::id::{generate_response_id, now_ms};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Awaiting human approval
    Pending,
    /// Send call in flight
    Sending,
    Sent,
    Failed,
    Skipped,
    Rejected,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Sending => "sending",
            ResponseStatus::Sent => "sent",
            ResponseStatus::Failed => "failed",
            ResponseStatus::Skipped => "skipped",
            ResponseStatus::Rejected => "rejected",
        }
    }

    /// Returns true if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseStatus::Sent | ResponseStatus::Failed | ResponseStatus::Skipped | ResponseStatus::Rejected
        )
    }

    pub fn can_transition_to(&self, next: ResponseStatus) -> bool {
        use ResponseStatus::*;
        matches!(
            (self, next),
            (Pending, Sending) | (Pending, Rejected) | (Pending, Failed) | (Sending, Sent) | (Sending, Failed)
        )
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResponseStatus::Pending),
            "sending" => Ok(ResponseStatus::Sending),
            "sent" => Ok(ResponseStatus::Sent),
            "failed" => Ok(ResponseStatus::Failed),
            "skipped" => Ok(ResponseStatus::Skipped),
            "rejected" => Ok(ResponseStatus::Rejected),
            other => Err(format!("unknown response status: {}", other)),
        }
    }
}

/// The reply attached 1:1 to a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub comment_id: String,

    /// Reply text; empty for skipped responses
    pub text: String,
    pub status: ResponseStatus,

    /// Model tag that produced the text
    pub model: Option<String>,
    pub tokens_used: u32,

    pub sent_at: Option<i64>,
    pub error: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Response {
    fn base(comment_id: &str, status: ResponseStatus) -> Self {
        let now = now_ms();
        Self {
            id: generate_response_id(),
            comment_id: comment_id.to_string(),
            text: String::new(),
            status,
            model: None,
            tokens_used: 0,
            sent_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record for a comment the policy chose not to answer
    pub fn skipped(comment_id: &str) -> Self {
        Self::base(comment_id, ResponseStatus::Skipped)
    }

    /// Generated reply waiting for approval
    pub fn pending(comment_id: &str, text: &str, model: Option<String>, tokens_used: u32) -> Self {
        Self {
            text: text.to_string(),
            model,
            tokens_used,
            ..Self::base(comment_id, ResponseStatus::Pending)
        }
    }

    /// Generated reply about to be sent directly
    pub fn sending(comment_id: &str, text: &str, model: Option<String>, tokens_used: u32) -> Self {
        Self {
            text: text.to_string(),
            model,
            tokens_used,
            ..Self::base(comment_id, ResponseStatus::Sending)
        }
    }

    /// Record for a candidate that failed before a reply existed
    pub fn failed(comment_id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(comment_id, ResponseStatus::Failed)
        }
    }

    /// Apply a lifecycle transition, rejecting anything the lifecycle forbids
    pub fn transition(&mut self, next: ResponseStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ReplyrError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now_ms();
        Ok(())
    }

    pub fn mark_sent(&mut self, at: i64) -> Result<()> {
        self.transition(ResponseStatus::Sent)?;
        self.sent_at = Some(at);
        self.error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(ResponseStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}
