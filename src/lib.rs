//! Replyr - multi-tenant comment triage and auto-reply dispatcher
//!
//! For each connected channel, Replyr periodically fetches new comments,
//! classifies them, filters them through the channel's policy, drafts a
//! reply and either sends it or holds it for approval, all within plan and
//! policy quotas.

pub mod credentials;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod filter;
pub mod id;
pub mod llm;
pub mod pipeline;
pub mod ports;
pub mod quota;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod storage;
pub mod worker;

pub use error::{ReplyrError, Result};
