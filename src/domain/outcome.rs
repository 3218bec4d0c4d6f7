//! Run outcomes
//!
//! Every pipeline invocation that does not hit an unexpected error ends in one
//! of these. Gated and configuration outcomes are reached before any external
//! call is made.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters for a run that reached the candidate loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Replies sent successfully
    pub responded: u32,
    /// Replies held for approval
    pub pending: u32,
    /// Comments recorded with a skipped response
    pub skipped: u32,
    /// Candidates dropped without a record (blacklist, safety refusal)
    pub discarded: u32,
    /// Responses recorded as failed
    pub failed: u32,
    /// Candidates already known to the dedup index
    pub duplicates: u32,
}

impl RunSummary {
    /// Responses that count against the run budget
    pub fn budget_used(&self) -> u32 {
        self.responded + self.pending
    }
}

/// Result of a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    IntegrationNotFound,
    NoPlan,
    NoConfig,
    AlreadyRunning,
    OutsideWorkingHours,
    PlanDailyLimitReached { sent_today: u32 },
    DailyLimitReached { sent_today: u32 },
    HourlyLimitReached { sent_this_hour: u32 },
    /// Per-run cap configured as zero
    RunBudgetExhausted,
    PlatformNotSupported { platform: String },
    InvalidCredentials { error: String },
    SourceApiError { error: String },
    Completed(RunSummary),
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::IntegrationNotFound => "integration_not_found",
            RunOutcome::NoPlan => "no_plan",
            RunOutcome::NoConfig => "no_config",
            RunOutcome::AlreadyRunning => "already_running",
            RunOutcome::OutsideWorkingHours => "outside_working_hours",
            RunOutcome::PlanDailyLimitReached { .. } => "plan_daily_limit_reached",
            RunOutcome::DailyLimitReached { .. } => "daily_limit_reached",
            RunOutcome::HourlyLimitReached { .. } => "hourly_limit_reached",
            RunOutcome::RunBudgetExhausted => "run_budget_exhausted",
            RunOutcome::PlatformNotSupported { .. } => "platform_not_supported",
            RunOutcome::InvalidCredentials { .. } => "invalid_credentials",
            RunOutcome::SourceApiError { .. } => "source_api_error",
            RunOutcome::Completed(_) => "completed",
        }
    }

    /// Quota or schedule gate; nothing external was touched
    pub fn is_gated(&self) -> bool {
        matches!(
            self,
            RunOutcome::AlreadyRunning
                | RunOutcome::OutsideWorkingHours
                | RunOutcome::PlanDailyLimitReached { .. }
                | RunOutcome::DailyLimitReached { .. }
                | RunOutcome::HourlyLimitReached { .. }
                | RunOutcome::RunBudgetExhausted
        )
    }

    /// Transient upstream failure worth another attempt by the task runner
    pub fn should_retry(&self) -> bool {
        matches!(self, RunOutcome::SourceApiError { .. })
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(s) => write!(
                f,
                "completed (responded={}, pending={}, skipped={}, discarded={}, failed={}, duplicates={})",
                s.responded, s.pending, s.skipped, s.discarded, s.failed, s.duplicates
            ),
            RunOutcome::SourceApiError { error } | RunOutcome::InvalidCredentials { error } => {
                write!(f, "{}: {}", self.as_str(), error)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}
