//! Durable run task records
//!
//! One row per enqueued run. The task id doubles as the handle returned by
//! `enqueue_run`.

use crate::domain::RunOutcome;
use crate::id::{generate_task_id, now_ms};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal state of a run task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    /// Retry ceiling exhausted; waits for the next scheduler tick
    Abandoned,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Abandoned => "abandoned",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Abandoned | TaskState::Cancelled)
    }
}

/// Externally visible status of a task handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Done,
}

impl From<TaskState> for RunStatus {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Queued => RunStatus::Queued,
            TaskState::Running => RunStatus::Running,
            TaskState::Done | TaskState::Abandoned | TaskState::Cancelled => RunStatus::Done,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Queued => f.write_str("queued"),
            RunStatus::Running => f.write_str("running"),
            RunStatus::Done => f.write_str("done"),
        }
    }
}

/// What `get_run_status` reports for a handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub task_id: String,
    pub status: RunStatus,
    pub state: TaskState,
    pub attempts: u32,
    pub result: Option<RunOutcome>,
    pub error: Option<String>,
}

/// A queued or executed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTask {
    pub id: String,
    pub integration_id: String,
    pub state: TaskState,
    pub attempts: u32,
    pub max_attempts: u32,

    /// Earliest time a worker may claim the task (ms)
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    pub result: Option<RunOutcome>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl RunTask {
    pub fn new(integration_id: &str, max_attempts: u32) -> Self {
        let now = now_ms();
        Self {
            id: generate_task_id(),
            integration_id: integration_id.to_string(),
            state: TaskState::Queued,
            attempts: 0,
            max_attempts,
            next_attempt_at: now,
            last_error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn report(&self) -> RunStatusReport {
        RunStatusReport {
            task_id: self.id.clone(),
            status: self.state.into(),
            state: self.state,
            attempts: self.attempts,
            result: self.result.clone(),
            error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_queued_and_due() {
        let t = RunTask::new("int-1", 3);
        assert_eq!(t.state, TaskState::Queued);
        assert_eq!(t.attempts, 0);
        assert!(t.next_attempt_at <= now_ms());
        assert!(t.has_attempts_left());
    }

    #[test]
    fn test_finished_states_report_done() {
        assert_eq!(RunStatus::from(TaskState::Cancelled), RunStatus::Done);
        assert_eq!(RunStatus::from(TaskState::Abandoned), RunStatus::Done);
        assert_eq!(RunStatus::from(TaskState::Running), RunStatus::Running);
    }

    #[test]
    fn test_attempt_ceiling() {
        let mut t = RunTask::new("int-1", 3);
        t.attempts = 3;
        assert!(!t.has_attempts_left());
    }

    #[test]
    fn test_report_carries_result() {
        let mut t = RunTask::new("int-1", 3);
        t.state = TaskState::Done;
        t.result = Some(RunOutcome::NoPlan);
        let r = t.report();
        assert_eq!(r.status, RunStatus::Done);
        assert_eq!(r.result, Some(RunOutcome::NoPlan));
    }
}
