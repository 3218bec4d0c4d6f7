//! Periodic scheduler
//!
//! Every tick enqueues one run task per enabled integration and prunes
//! finished tasks past their retention. Overlapping runs of one integration
//! are serialised by the run lease, not here.

mod tick;

pub use tick::{TickConfig, TickResult, TickState};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::storage::Store;
use crate::worker::TaskQueue;

pub struct Scheduler {
    store: Arc<dyn Store>,
    queue: TaskQueue,
    config: TickConfig,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, queue: TaskQueue, config: TickConfig) -> Self {
        Self { store, queue, config }
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Enqueue a run for every enabled integration, then prune old tasks
    pub fn tick(&self) -> Result<TickResult> {
        let mut result = TickResult::default();

        for integration in self.store.list_enabled_integrations()? {
            match self.queue.enqueue(&integration.id) {
                Ok(_) => result.enqueued += 1,
                Err(e) => {
                    tracing::error!(integration_id = %integration.id, error = %e, "Failed to enqueue run");
                    result.errors += 1;
                }
            }
        }

        match self.queue.prune_finished(self.config.task_retention) {
            Ok(pruned) => result.pruned = pruned,
            Err(e) => tracing::warn!(error = %e, "Failed to prune finished tasks"),
        }

        tracing::info!(
            enqueued = result.enqueued,
            errors = result.errors,
            pruned = result.pruned,
            "Scheduler tick"
        );
        Ok(result)
    }

    /// Tick every `tick_interval` until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<TickState> {
        let mut state = TickState::new();
        let start = if self.config.tick_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.config.tick_interval
        };
        let mut interval = tokio::time::interval_at(start, self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Scheduler started, interval {:?}", self.config.tick_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick() {
                        Ok(result) => state.record(&result),
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduler tick failed");
                            state.total_errors += 1;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Scheduler stopped after {} tick(s)", state.tick_count);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Integration, Platform, RunTask, TaskState};
    use crate::id::now_ms;
    use crate::storage::SqliteStore;
    use std::time::Duration;

    fn setup() -> (Arc<SqliteStore>, Scheduler) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .create_integration(&Integration::new("t1", Platform::Youtube, "UC1").with_id("int-1"))
            .unwrap();
        let mut disabled = Integration::new("t1", Platform::Youtube, "UC2").with_id("int-2");
        disabled.disable();
        store.create_integration(&disabled).unwrap();

        let queue = TaskQueue::new(store.clone(), 3);
        let scheduler = Scheduler::new(store.clone(), queue, TickConfig::new(Duration::from_secs(60)));
        (store, scheduler)
    }

    #[test]
    fn test_tick_enqueues_enabled_integrations() {
        let (store, scheduler) = setup();
        let result = scheduler.tick().unwrap();
        assert_eq!(result.enqueued, 1);
        assert_eq!(result.errors, 0);

        let task = store.claim_next_task(now_ms()).unwrap().unwrap();
        assert_eq!(task.integration_id, "int-1");
        assert!(store.claim_next_task(now_ms()).unwrap().is_none());
    }

    #[test]
    fn test_each_tick_enqueues_again() {
        let (store, scheduler) = setup();
        scheduler.tick().unwrap();
        scheduler.tick().unwrap();

        let first = store.claim_next_task(now_ms()).unwrap().unwrap();
        let second = store.claim_next_task(now_ms()).unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.state, TaskState::Running);
    }

    #[test]
    fn test_tick_prunes_old_finished_tasks() {
        let (store, scheduler) = setup();
        let mut old = RunTask::new("int-1", 3);
        old.state = TaskState::Done;
        old.updated_at = now_ms() - 30 * 86_400_000;
        store.insert_task(&old).unwrap();
        let mut recent = RunTask::new("int-1", 3);
        recent.state = TaskState::Cancelled;
        store.insert_task(&recent).unwrap();

        let result = scheduler.tick().unwrap();
        assert_eq!(result.pruned, 1);
        assert!(store.get_task(&old.id).unwrap().is_none());
        assert!(store.get_task(&recent.id).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let (_, scheduler) = setup();
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            tx.send(true).unwrap();
        });

        let state = scheduler.run(rx).await.unwrap();
        stopper.await.unwrap();

        // t=0, 60, 120
        assert_eq!(state.tick_count, 3);
        assert_eq!(state.total_enqueued, 3);
        assert_eq!(state.total_errors, 0);
    }
}
