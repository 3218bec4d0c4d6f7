//! Domain types for Replyr
//!
//! This module contains the core records the run pipeline reads and writes:
//! - Integration / Tenant: who a run is for and which plan ceiling applies
//! - Policy: per-integration behavior, read-only during a run
//! - Comment / Category: inbound comments and their canonical classification
//! - Response: the per-comment reply and its lifecycle
//! - RunOutcome: what a single pipeline invocation concluded
//! - RunTask: durable queue record for an enqueued run

pub mod comment;
pub mod integration;
pub mod outcome;
pub mod policy;
pub mod response;
pub mod task;

pub use comment::{Category, Comment, RawComment};
pub use integration::{Integration, Plan, Platform, Tenant};
pub use outcome::{RunOutcome, RunSummary};
pub use policy::{Policy, Tone, WorkingHours};
pub use response::{Response, ResponseStatus};
pub use task::{RunStatus, RunStatusReport, RunTask, TaskState};
