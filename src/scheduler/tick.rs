//! Scheduler tick bookkeeping

use std::time::Duration;

/// Configuration for the scheduler tick loop
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Interval between ticks
    pub tick_interval: Duration,
    /// Run one tick immediately on start instead of waiting a full interval
    pub tick_on_start: bool,
    /// Finished tasks older than this are deleted on each tick
    pub task_retention: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15 * 60),
            tick_on_start: true,
            task_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl TickConfig {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..Default::default()
        }
    }

    pub fn with_tick_on_start(mut self, tick_on_start: bool) -> Self {
        self.tick_on_start = tick_on_start;
        self
    }

    pub fn with_task_retention(mut self, task_retention: Duration) -> Self {
        self.task_retention = task_retention;
        self
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickResult {
    /// Runs queued this tick
    pub enqueued: usize,
    /// Integrations whose enqueue failed
    pub errors: usize,
    /// Finished tasks deleted this tick
    pub pruned: usize,
}

/// Counters across the scheduler's lifetime
#[derive(Debug, Default)]
pub struct TickState {
    pub tick_count: u64,
    pub total_enqueued: u64,
    pub total_errors: u64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's result into the totals
    pub fn record(&mut self, result: &TickResult) {
        self.tick_count += 1;
        self.total_enqueued += result.enqueued as u64;
        self.total_errors += result.errors as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_config_default() {
        let config = TickConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(900));
        assert!(config.tick_on_start);
        assert_eq!(config.task_retention, Duration::from_secs(604_800));
    }

    #[test]
    fn test_tick_config_builders() {
        let config = TickConfig::new(Duration::from_secs(5))
            .with_tick_on_start(false)
            .with_task_retention(Duration::from_secs(3600));
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert!(!config.tick_on_start);
        assert_eq!(config.task_retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_tick_state_record() {
        let mut state = TickState::new();
        state.record(&TickResult {
            enqueued: 3,
            errors: 0,
            pruned: 0,
        });
        state.record(&TickResult {
            enqueued: 1,
            errors: 2,
            pruned: 5,
        });
        assert_eq!(state.tick_count, 2);
        assert_eq!(state.total_enqueued, 4);
        assert_eq!(state.total_errors, 2);
    }
}
