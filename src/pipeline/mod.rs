//! Run pipeline: quota gating, dedup, filtering, reply generation and dispatch
//! for one integration, plus the human approval actions on held replies.

pub mod approval;
pub mod lease;
pub mod pacing;
pub mod recovery;
pub mod runner;

pub use lease::{RunClock, RunLease};
pub use pacing::SendPacer;
pub use recovery::{RecoveryStats, UNKNOWN_OUTCOME_DETAIL, resolve_stale_sends};
pub use runner::{PipelineConfig, RunPipeline, SEND_TIMEOUT_DETAIL};
