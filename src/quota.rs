//! Quota ledger
//!
//! Derives remaining allowance from sent responses already in the store.
//! Nothing here writes; the windows are recomputed on every read.
//!
//! - tenant daily: sent responses across all of the tenant's integrations
//!   since UTC start of day, against the plan ceiling
//! - integration daily: same window, against the policy's daily cap
//! - integration hourly: trailing 60 minutes, against the policy's hourly cap

use crate::domain::{Integration, Policy, RunOutcome};
use crate::error::Result;
use crate::storage::Store;
use chrono::{DateTime, Utc};

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Milliseconds at 00:00:00 UTC of the day containing `now`
pub fn start_of_day_ms(now: DateTime<Utc>) -> i64 {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

/// Caps in force for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCaps {
    pub plan_daily: u32,
    pub integration_daily: u32,
    pub hourly: u32,
    pub per_run: u32,
}

impl QuotaCaps {
    pub fn new(plan_daily: u32, policy: &Policy) -> Self {
        Self {
            plan_daily,
            integration_daily: policy.max_comments_per_day,
            hourly: policy.max_comments_per_hour,
            per_run: policy.max_responses_per_run,
        }
    }
}

/// Usage counters read from the store plus the caps they are measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub caps: QuotaCaps,
    pub tenant_sent_today: u32,
    pub integration_sent_today: u32,
    pub sent_this_hour: u32,
}

impl QuotaSnapshot {
    /// Tenant may send at all today
    pub fn allowed(&self) -> bool {
        self.tenant_sent_today < self.caps.plan_daily
    }

    pub fn daily_remaining(&self) -> u32 {
        let plan = self.caps.plan_daily.saturating_sub(self.tenant_sent_today);
        let integration = self.caps.integration_daily.saturating_sub(self.integration_sent_today);
        plan.min(integration)
    }

    pub fn hourly_remaining(&self) -> u32 {
        self.caps.hourly.saturating_sub(self.sent_this_hour)
    }

    /// Responses this run may produce
    pub fn run_budget(&self) -> u32 {
        self.caps
            .per_run
            .min(self.daily_remaining())
            .min(self.hourly_remaining())
    }

    /// The gate that stops the run, if any. Checked in order: plan, integration
    /// daily, hourly, per-run.
    pub fn gate(&self) -> Option<RunOutcome> {
        if let Some(gated) = self.send_gate() {
            return Some(gated);
        }
        if self.run_budget() == 0 {
            return Some(RunOutcome::RunBudgetExhausted);
        }
        None
    }

    /// The cap a single send would break, ignoring the per-run budget.
    /// Approvals go through this one.
    pub fn send_gate(&self) -> Option<RunOutcome> {
        if !self.allowed() {
            return Some(RunOutcome::PlanDailyLimitReached {
                sent_today: self.tenant_sent_today,
            });
        }
        if self.integration_sent_today >= self.caps.integration_daily {
            return Some(RunOutcome::DailyLimitReached {
                sent_today: self.integration_sent_today,
            });
        }
        if self.hourly_remaining() == 0 {
            return Some(RunOutcome::HourlyLimitReached {
                sent_this_hour: self.sent_this_hour,
            });
        }
        None
    }
}

/// Read-only view over sent-response history
pub struct QuotaLedger<'a> {
    store: &'a dyn Store,
}

impl<'a> QuotaLedger<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    pub fn snapshot(&self, integration: &Integration, caps: QuotaCaps, now: DateTime<Utc>) -> Result<QuotaSnapshot> {
        let day_start = start_of_day_ms(now);
        let hour_start = now.timestamp_millis() - HOUR_MS;

        Ok(QuotaSnapshot {
            caps,
            tenant_sent_today: self.store.count_sent_for_tenant(&integration.tenant_id, day_start)?,
            integration_sent_today: self.store.count_sent_for_integration(&integration.id, day_start)?,
            sent_this_hour: self.store.count_sent_for_integration(&integration.id, hour_start)?,
        })
    }

    /// `(daily_remaining, hourly_remaining, allowed)`
    pub fn remaining(
        &self,
        integration: &Integration,
        caps: QuotaCaps,
        now: DateTime<Utc>,
    ) -> Result<(u32, u32, bool)> {
        let snap = self.snapshot(integration, caps, now)?;
        Ok((snap.daily_remaining(), snap.hourly_remaining(), snap.allowed()))
    }
}
