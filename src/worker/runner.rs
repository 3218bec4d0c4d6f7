//! Task runner: claims queued runs and drives the pipeline
//!
//! Each worker loop claims one task at a time. The pipeline run is spawned
//! onto its own tokio task so `cancel` can abort it; an aborted run leaves
//! its lease to expire by TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::domain::RunTask;
use crate::error::Result;
use crate::id::now_ms;
use crate::pipeline::RunPipeline;
use crate::worker::queue::TaskQueue;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent worker loops
    pub workers: usize,
    pub max_attempts: u32,
    /// Delay before a failed run is retried
    pub retry_backoff: Duration,
    /// Sleep between claims when the queue is empty
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct TaskRunner {
    queue: TaskQueue,
    pipeline: Arc<RunPipeline>,
    config: WorkerConfig,
    running: Mutex<HashMap<String, AbortHandle>>,
}

impl TaskRunner {
    pub fn new(queue: TaskQueue, pipeline: Arc<RunPipeline>, config: WorkerConfig) -> Self {
        Self {
            queue,
            pipeline,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Number of runs currently executing in this process
    pub fn running_count(&self) -> usize {
        self.running.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Claim and execute one due task. Returns the task as stored afterwards.
    pub async fn run_once(&self) -> Result<Option<RunTask>> {
        let Some(task) = self.queue.claim(now_ms())? else {
            return Ok(None);
        };

        tracing::info!(
            task_id = %task.id,
            integration_id = %task.integration_id,
            attempt = task.attempts,
            "Run started"
        );

        let pipeline = self.pipeline.clone();
        let integration_id = task.integration_id.clone();
        let handle = tokio::spawn(async move { pipeline.run(&integration_id).await });
        self.track(&task.id, handle.abort_handle());

        let joined = handle.await;
        self.untrack(&task.id);

        let backoff = self.config.retry_backoff;
        let stored = match joined {
            Ok(Ok(outcome)) if outcome.should_retry() => {
                let error = outcome.to_string();
                self.queue.retry(task, error, Some(outcome), backoff)?
            }
            Ok(Ok(outcome)) => {
                tracing::info!(task_id = %task.id, outcome = %outcome, "Run done");
                self.queue.complete(task, outcome)?
            }
            Ok(Err(e)) if e.is_fatal_input() => self.queue.abandon(task, e.to_string(), None)?,
            Ok(Err(e)) => self.queue.retry(task, e.to_string(), None, backoff)?,
            Err(e) if e.is_cancelled() => {
                tracing::info!(task_id = %task.id, "Run aborted");
                self.queue.get(&task.id)?
            }
            Err(e) => self.queue.retry(task, format!("run panicked: {}", e), None, backoff)?,
        };

        Ok(Some(stored))
    }

    /// Cancel a task and abort it if it is executing here
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        let cancelled = self.queue.cancel(task_id)?;
        if cancelled {
            if let Some(handle) = self.running.lock().ok().and_then(|r| r.get(task_id).cloned()) {
                tracing::info!(task_id, "Aborting in-flight run");
                handle.abort();
            }
        }
        Ok(cancelled)
    }

    /// Run `workers` claim loops until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.queue.recover_orphans(self.pipeline.config().lease_ttl)?;

        let workers = self.config.workers.max(1);
        log::info!("Starting {} worker(s)", workers);

        let loops = (0..workers).map(|worker| {
            let runner = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runner.worker_loop(worker, shutdown).await })
        });
        futures::future::join_all(loops).await;

        log::info!("Workers stopped");
        Ok(())
    }

    async fn worker_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => tracing::error!(worker, error = %e, "Worker iteration failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(worker, "Worker loop exited");
    }

    fn track(&self, task_id: &str, handle: AbortHandle) {
        if let Ok(mut running) = self.running.lock() {
            running.insert(task_id.to_string(), handle);
        }
    }

    fn untrack(&self, task_id: &str) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(task_id);
        }
    }
}
