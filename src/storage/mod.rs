//! Persistence boundary for Replyr
//!
//! The run pipeline only talks to the `Store` trait. `SqliteStore` is the
//! production implementation; every method is a short synchronous call
//! guarded by a mutex, so the trait is `Send + Sync` and shared via `Arc`.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::domain::{Comment, Integration, Policy, Response, ResponseStatus, RunTask, TaskState, Tenant};
use crate::error::Result;

/// Everything the dispatcher persists
pub trait Store: Send + Sync {
    //=== Tenants & integrations ===
    fn upsert_tenant(&self, tenant: &Tenant) -> Result<()>;
    fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;

    /// Insert a new integration. Fails with `Conflict` if another enabled
    /// integration already exists for the same (tenant, platform, channel).
    fn create_integration(&self, integration: &Integration) -> Result<()>;
    fn get_integration(&self, id: &str) -> Result<Option<Integration>>;
    fn update_integration(&self, integration: &Integration) -> Result<()>;
    fn list_enabled_integrations(&self) -> Result<Vec<Integration>>;
    fn touch_last_run(&self, integration_id: &str, at: i64) -> Result<()>;

    /// The integration, if it exists and is enabled
    fn get_enabled_integration(&self, id: &str) -> Result<Option<Integration>> {
        Ok(self.get_integration(id)?.filter(|i| i.enabled))
    }

    //=== Policies ===
    fn get_policy(&self, integration_id: &str) -> Result<Option<Policy>>;
    fn save_policy(&self, integration_id: &str, policy: &Policy) -> Result<()>;

    //=== Comments & responses ===
    fn comment_exists(&self, external_id: &str) -> Result<bool>;

    /// Insert a comment and its response in one transaction.
    /// Returns false (and writes nothing) if the external id is already recorded.
    fn record_comment(&self, comment: &Comment, response: &Response) -> Result<bool>;
    fn get_comment(&self, id: &str) -> Result<Option<Comment>>;
    fn get_response(&self, id: &str) -> Result<Option<Response>>;
    fn update_response(&self, response: &Response) -> Result<()>;

    /// Persist `response` only if the stored status still equals `expected`.
    fn update_response_if(&self, response: &Response, expected: ResponseStatus) -> Result<bool>;
    fn list_responses(&self, integration_id: &str, status: ResponseStatus) -> Result<Vec<Response>>;

    /// Sent responses for one integration with `sent_at >= since`
    fn count_sent_for_integration(&self, integration_id: &str, since: i64) -> Result<u32>;

    /// Sent responses across all of a tenant's integrations with `sent_at >= since`
    fn count_sent_for_tenant(&self, tenant_id: &str, since: i64) -> Result<u32>;

    //=== Run leases ===
    /// Take the per-integration lease if it is free, expired, or already ours.
    fn acquire_lease(&self, integration_id: &str, holder: &str, ttl_ms: i64, now: i64) -> Result<bool>;
    fn release_lease(&self, integration_id: &str, holder: &str) -> Result<()>;

    //=== Run tasks ===
    fn insert_task(&self, task: &RunTask) -> Result<()>;
    fn get_task(&self, id: &str) -> Result<Option<RunTask>>;
    /// Write `task` only while the stored row is still in `expected`; false when it moved on.
    fn update_task_if(&self, task: &RunTask, expected: TaskState) -> Result<bool>;
    /// Move a queued or running task to cancelled, leaving the rest of the record untouched.
    fn cancel_task(&self, id: &str, now: i64) -> Result<bool>;
    /// Delete finished tasks last touched before `before`.
    fn prune_finished_tasks(&self, before: i64) -> Result<usize>;

    /// Atomically move the oldest due queued task to running and bump its attempts.
    fn claim_next_task(&self, now: i64) -> Result<Option<RunTask>>;

    /// Put tasks left running by a dead process back in the queue.
    ///
    /// Only tasks untouched since `stale_before` whose integration has no live
    /// lease qualify; a run still holding its lease is not an orphan.
    fn requeue_running_tasks(&self, stale_before: i64, now: i64) -> Result<usize>;
}
