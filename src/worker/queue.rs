//! Durable run-task queue on top of the store

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{RunOutcome, RunStatusReport, RunTask, TaskState};
use crate::error::{ReplyrError, Result};
use crate::id::now_ms;
use crate::storage::Store;

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn Store>,
    max_attempts: u32,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Queue a run for `integration_id`, due immediately
    pub fn enqueue(&self, integration_id: &str) -> Result<RunTask> {
        let task = RunTask::new(integration_id, self.max_attempts);
        self.store.insert_task(&task)?;
        tracing::info!(task_id = %task.id, integration_id, "Run queued");
        Ok(task)
    }

    pub fn get(&self, task_id: &str) -> Result<RunTask> {
        self.store
            .get_task(task_id)?
            .ok_or_else(|| ReplyrError::TaskNotFound(task_id.to_string()))
    }

    pub fn status(&self, task_id: &str) -> Result<RunStatusReport> {
        Ok(self.get(task_id)?.report())
    }

    /// Mark a queued or running task cancelled. Returns false if it already finished.
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        if !self.store.cancel_task(task_id, now_ms())? {
            // Distinguish an unknown handle from one that already finished
            self.get(task_id)?;
            return Ok(false);
        }
        tracing::info!(task_id, "Run cancelled");
        Ok(true)
    }

    /// Claim the oldest due task
    pub fn claim(&self, now: i64) -> Result<Option<RunTask>> {
        self.store.claim_next_task(now)
    }

    /// Record a finished run
    pub fn complete(&self, task: RunTask, outcome: RunOutcome) -> Result<RunTask> {
        self.finish(task, |task| {
            task.state = TaskState::Done;
            task.result = Some(outcome);
        })
    }

    /// Requeue after a failed attempt, or abandon once attempts are used up
    pub fn retry(
        &self,
        task: RunTask,
        error: String,
        outcome: Option<RunOutcome>,
        backoff: Duration,
    ) -> Result<RunTask> {
        if !task.has_attempts_left() {
            return self.abandon(task, error, outcome);
        }

        let delay_ms = backoff.as_millis() as i64;

        self.finish(task, |task| {
            tracing::warn!(
                task_id = %task.id,
                attempt = task.attempts,
                max_attempts = task.max_attempts,
                delay_ms,
                error = %error,
                "Run failed, requeueing"
            );
            task.state = TaskState::Queued;
            task.next_attempt_at = now_ms().saturating_add(delay_ms);
            task.last_error = Some(error);
            task.result = outcome;
        })
    }

    pub fn abandon(&self, task: RunTask, error: String, outcome: Option<RunOutcome>) -> Result<RunTask> {
        self.finish(task, |task| {
            tracing::error!(
                task_id = %task.id,
                attempts = task.attempts,
                error = %error,
                "Run abandoned"
            );
            task.state = TaskState::Abandoned;
            task.last_error = Some(error);
            task.result = outcome;
        })
    }

    /// Requeue tasks a dead process left running.
    ///
    /// A task counts as orphaned once it has not been touched for `stale_after`
    /// and no run holds its integration's lease.
    pub fn recover_orphans(&self, stale_after: Duration) -> Result<usize> {
        let now = now_ms();
        let stale_before = now.saturating_sub(stale_after.as_millis() as i64);
        let count = self.store.requeue_running_tasks(stale_before, now)?;
        if count > 0 {
            log::warn!("Requeued {} orphaned run task(s)", count);
        }
        Ok(count)
    }

    /// Delete finished tasks older than `retention`
    pub fn prune_finished(&self, retention: Duration) -> Result<usize> {
        let before = now_ms().saturating_sub(retention.as_millis() as i64);
        let removed = self.store.prune_finished_tasks(before)?;
        if removed > 0 {
            log::debug!("Pruned {} finished run task(s)", removed);
        }
        Ok(removed)
    }

    /// Apply `update` to a running task. If the stored task moved on (a cancel
    /// landed while the run was in flight) the stored record wins.
    fn finish(&self, mut task: RunTask, update: impl FnOnce(&mut RunTask)) -> Result<RunTask> {
        update(&mut task);
        task.updated_at = now_ms();
        if self.store.update_task_if(&task, TaskState::Running)? {
            return Ok(task);
        }
        tracing::debug!(task_id = %task.id, "Task changed during run, keeping stored state");
        self.get(&task.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunStatus, RunSummary};
    use crate::storage::SqliteStore;

    fn queue(max_attempts: u32) -> TaskQueue {
        TaskQueue::new(Arc::new(SqliteStore::open_in_memory().unwrap()), max_attempts)
    }

    #[test]
    fn test_enqueue_and_status() {
        let q = queue(3);
        let task = q.enqueue("int-1").unwrap();

        let report = q.status(&task.id).unwrap();
        assert_eq!(report.status, RunStatus::Queued);
        assert_eq!(report.attempts, 0);
        assert!(report.result.is_none());
    }

    #[test]
    fn test_unknown_task() {
        assert!(matches!(queue(3).status("task-x"), Err(ReplyrError::TaskNotFound(_))));
    }

    #[test]
    fn test_claim_marks_running() {
        let q = queue(3);
        let task = q.enqueue("int-1").unwrap();

        let claimed = q.claim(now_ms()).unwrap().unwrap();
        assert_eq!(claimed.id, task.id);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(q.status(&task.id).unwrap().status, RunStatus::Running);
        assert!(q.claim(now_ms()).unwrap().is_none());
    }

    #[test]
    fn test_complete_stores_outcome() {
        let q = queue(3);
        q.enqueue("int-1").unwrap();
        let claimed = q.claim(now_ms()).unwrap().unwrap();

        let done = q.complete(claimed, RunOutcome::Completed(RunSummary::default())).unwrap();
        assert_eq!(done.state, TaskState::Done);

        let report = q.status(&done.id).unwrap();
        assert_eq!(report.status, RunStatus::Done);
        assert!(matches!(report.result, Some(RunOutcome::Completed(_))));
    }

    #[test]
    fn test_retry_backs_off_then_abandons() {
        let q = queue(2);
        q.enqueue("int-1").unwrap();

        let first = q.claim(now_ms()).unwrap().unwrap();
        let requeued = q
            .retry(first, "boom".to_string(), None, Duration::from_secs(60))
            .unwrap();
        assert_eq!(requeued.state, TaskState::Queued);
        assert!(requeued.next_attempt_at > now_ms());
        assert!(q.claim(now_ms()).unwrap().is_none());

        let second = q.claim(requeued.next_attempt_at).unwrap().unwrap();
        assert_eq!(second.attempts, 2);
        let abandoned = q
            .retry(second, "boom again".to_string(), None, Duration::from_secs(60))
            .unwrap();
        assert_eq!(abandoned.state, TaskState::Abandoned);
        assert_eq!(abandoned.last_error.as_deref(), Some("boom again"));
        assert_eq!(q.status(&abandoned.id).unwrap().status, RunStatus::Done);
    }

    #[test]
    fn test_cancel() {
        let q = queue(3);
        let task = q.enqueue("int-1").unwrap();
        assert!(q.cancel(&task.id).unwrap());
        assert!(!q.cancel(&task.id).unwrap());
        assert!(q.claim(now_ms()).unwrap().is_none());
        assert_eq!(q.status(&task.id).unwrap().state, TaskState::Cancelled);
    }

    #[test]
    fn test_result_after_cancel_is_dropped() {
        let q = queue(3);
        q.enqueue("int-1").unwrap();
        let claimed = q.claim(now_ms()).unwrap().unwrap();
        assert!(q.cancel(&claimed.id).unwrap());

        let after = q.complete(claimed, RunOutcome::NoPlan).unwrap();
        assert_eq!(after.state, TaskState::Cancelled);
        assert!(after.result.is_none());
    }

    #[test]
    fn test_cancel_keeps_attempts() {
        let q = queue(3);
        q.enqueue("int-1").unwrap();
        let claimed = q.claim(now_ms()).unwrap().unwrap();

        assert!(q.cancel(&claimed.id).unwrap());
        let report = q.status(&claimed.id).unwrap();
        assert_eq!(report.state, TaskState::Cancelled);
        assert_eq!(report.attempts, 1);

        let retried = q
            .retry(claimed, "late failure".to_string(), None, Duration::from_secs(60))
            .unwrap();
        assert_eq!(retried.state, TaskState::Cancelled);
        assert!(retried.last_error.is_none());
    }

    #[test]
    fn test_cancel_unknown_task() {
        assert!(matches!(queue(3).cancel("task-x"), Err(ReplyrError::TaskNotFound(_))));
    }

    #[test]
    fn test_recover_orphans_leaves_fresh_runs() {
        let q = queue(3);
        let task = q.enqueue("int-1").unwrap();
        q.claim(now_ms()).unwrap();

        assert_eq!(q.recover_orphans(Duration::from_secs(900)).unwrap(), 0);
        assert_eq!(q.status(&task.id).unwrap().status, RunStatus::Running);
    }

    #[test]
    fn test_recover_orphans_requeues_stale_runs() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let q = TaskQueue::new(store.clone(), 3);
        let mut task = RunTask::new("int-1", 3);
        task.state = TaskState::Running;
        task.attempts = 1;
        task.updated_at = now_ms() - 3_600_000;
        store.insert_task(&task).unwrap();

        assert_eq!(q.recover_orphans(Duration::from_secs(900)).unwrap(), 1);
        assert_eq!(q.status(&task.id).unwrap().status, RunStatus::Queued);
        assert_eq!(q.recover_orphans(Duration::from_secs(900)).unwrap(), 0);
    }

    #[test]
    fn test_prune_finished_keeps_recent() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let q = TaskQueue::new(store.clone(), 3);
        let mut old = RunTask::new("int-1", 3);
        old.state = TaskState::Done;
        old.updated_at = now_ms() - 8 * 86_400_000;
        store.insert_task(&old).unwrap();
        let queued = q.enqueue("int-1").unwrap();

        assert_eq!(q.prune_finished(Duration::from_secs(7 * 86_400)).unwrap(), 1);
        assert!(matches!(q.status(&old.id), Err(ReplyrError::TaskNotFound(_))));
        assert!(q.status(&queued.id).is_ok());
    }
}
