//! Scheduler, queue, runner and trigger surface working together

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FixtureBuilder, INTEGRATION, praise};
use replyr::domain::{RunOutcome, RunStatus, TaskState};
use replyr::error::ReplyrError;
use replyr::ports::MockSource;
use replyr::scheduler::{Scheduler, TickConfig};
use replyr::service::ReplyService;
use replyr::storage::Store;
use replyr::worker::{TaskQueue, TaskRunner, WorkerConfig};
use tokio::sync::watch;

fn wire(fx: &common::Fixture, max_attempts: u32) -> (Arc<TaskRunner>, ReplyService, Scheduler) {
    let queue = TaskQueue::new(fx.store.clone(), max_attempts);
    let config = WorkerConfig::default()
        .with_workers(2)
        .with_retry_backoff(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(10));
    let runner = Arc::new(TaskRunner::new(queue.clone(), fx.pipeline.clone(), config));
    let service = ReplyService::new(runner.clone(), fx.pipeline.clone());
    let scheduler = Scheduler::new(fx.store.clone(), queue, TickConfig::new(Duration::from_secs(900)));
    (runner, service, scheduler)
}

#[tokio::test]
async fn test_enqueue_run_and_poll_status() {
    let fx = FixtureBuilder::new().comments(praise("p", 2)).build();
    let (runner, service, _) = wire(&fx, 3);

    let handle = service.enqueue_run(INTEGRATION).unwrap();
    assert_eq!(service.get_run_status(&handle).unwrap().status, RunStatus::Queued);

    runner.run_once().await.unwrap();

    let report = service.get_run_status(&handle).unwrap();
    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.attempts, 1);
    match report.result {
        Some(RunOutcome::Completed(summary)) => assert_eq!(summary.responded, 2),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_failure_retried_then_abandoned() {
    let fx = FixtureBuilder::new()
        .source(MockSource::new().with_fetch_error("quota backend unavailable"))
        .build();
    let (runner, service, _) = wire(&fx, 3);
    let handle = service.enqueue_run(INTEGRATION).unwrap();

    for _ in 0..3 {
        runner.run_once().await.unwrap();
    }
    assert!(runner.run_once().await.unwrap().is_none());

    let report = service.get_run_status(&handle).unwrap();
    assert_eq!(report.state, TaskState::Abandoned);
    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.attempts, 3);
    assert!(report.error.unwrap().contains("quota backend unavailable"));
    assert_eq!(fx.source.fetch_count(), 3);
}

#[tokio::test]
async fn test_cancelled_task_never_runs() {
    let fx = FixtureBuilder::new().comments(praise("p", 1)).build();
    let (runner, service, _) = wire(&fx, 3);

    let handle = service.enqueue_run(INTEGRATION).unwrap();
    assert!(service.cancel_run(&handle).unwrap());
    assert!(runner.run_once().await.unwrap().is_none());
    assert_eq!(fx.source.fetch_count(), 0);
    assert_eq!(service.get_run_status(&handle).unwrap().status, RunStatus::Done);
}

#[tokio::test]
async fn test_enqueue_unknown_integration() {
    let fx = FixtureBuilder::new().build();
    let (_, service, _) = wire(&fx, 3);
    assert!(matches!(
        service.enqueue_run("int-missing"),
        Err(ReplyrError::IntegrationNotFound(_))
    ));
    assert!(matches!(
        service.get_run_status("task-missing"),
        Err(ReplyrError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_tick_then_workers_drain_queue() {
    let fx = FixtureBuilder::new().comments(praise("p", 3)).build();
    let (runner, _, scheduler) = wire(&fx, 3);

    // Two ticks queue two runs; the lease and dedup keep the second harmless
    assert_eq!(scheduler.tick().unwrap().enqueued, 1);
    assert_eq!(scheduler.tick().unwrap().enqueued, 1);

    let (tx, rx) = watch::channel(false);
    let workers = tokio::spawn(runner.clone().run(rx));
    while fx.source.sent().len() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    workers.await.unwrap().unwrap();

    assert_eq!(fx.source.send_count(), 3);
    assert_eq!(fx.store.count_sent_for_integration(INTEGRATION, 0).unwrap(), 3);
}
