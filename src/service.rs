//! Trigger surface
//!
//! The operations an outer layer (CLI, HTTP handler, admin tool) calls:
//! enqueue a run, poll it, cancel it, and act on held replies.

use std::sync::Arc;

use crate::domain::{Response, RunStatusReport};
use crate::error::{ReplyrError, Result};
use crate::pipeline::RunPipeline;
use crate::worker::TaskRunner;

pub struct ReplyService {
    runner: Arc<TaskRunner>,
    pipeline: Arc<RunPipeline>,
}

impl ReplyService {
    pub fn new(runner: Arc<TaskRunner>, pipeline: Arc<RunPipeline>) -> Self {
        Self { runner, pipeline }
    }

    /// Queue a run for an enabled integration and return its task handle
    pub fn enqueue_run(&self, integration_id: &str) -> Result<String> {
        self.pipeline
            .store()
            .get_enabled_integration(integration_id)?
            .ok_or_else(|| ReplyrError::IntegrationNotFound(integration_id.to_string()))?;
        Ok(self.runner.queue().enqueue(integration_id)?.id)
    }

    pub fn get_run_status(&self, task_id: &str) -> Result<RunStatusReport> {
        self.runner.queue().status(task_id)
    }

    /// Best effort: a run already past its last send still commits what it did
    pub fn cancel_run(&self, task_id: &str) -> Result<bool> {
        self.runner.cancel(task_id)
    }

    pub async fn approve_response(&self, response_id: &str) -> Result<Response> {
        self.pipeline.approve_response(response_id).await
    }

    pub fn reject_response(&self, response_id: &str) -> Result<Response> {
        self.pipeline.reject_response(response_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::domain::{Integration, Platform, RunStatus};
    use crate::pipeline::PipelineConfig;
    use crate::ports::{MockClassifier, MockResponder};
    use crate::source::SourceRegistry;
    use crate::storage::{SqliteStore, Store};
    use crate::worker::{TaskQueue, WorkerConfig};

    fn service() -> ReplyService {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .create_integration(&Integration::new("t1", Platform::Youtube, "UC1").with_id("int-1"))
            .unwrap();
        let mut off = Integration::new("t1", Platform::Youtube, "UC2").with_id("int-off");
        off.disable();
        store.create_integration(&off).unwrap();

        let pipeline = Arc::new(RunPipeline::new(
            store.clone(),
            Arc::new(StaticCredentials::new("token")),
            Arc::new(SourceRegistry::new()),
            Arc::new(MockClassifier::new()),
            Arc::new(MockResponder::new()),
            PipelineConfig::default(),
        ));
        let runner = Arc::new(TaskRunner::new(
            TaskQueue::new(store, 3),
            pipeline.clone(),
            WorkerConfig::default(),
        ));
        ReplyService::new(runner, pipeline)
    }

    #[test]
    fn test_enqueue_requires_enabled_integration() {
        let svc = service();
        assert!(matches!(svc.enqueue_run("missing"), Err(ReplyrError::IntegrationNotFound(_))));
        assert!(matches!(svc.enqueue_run("int-off"), Err(ReplyrError::IntegrationNotFound(_))));

        let handle = svc.enqueue_run("int-1").unwrap();
        assert_eq!(svc.get_run_status(&handle).unwrap().status, RunStatus::Queued);
    }

    #[test]
    fn test_cancel_reports_done() {
        let svc = service();
        let handle = svc.enqueue_run("int-1").unwrap();
        assert!(svc.cancel_run(&handle).unwrap());
        assert_eq!(svc.get_run_status(&handle).unwrap().status, RunStatus::Done);
        assert!(!svc.cancel_run(&handle).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_response() {
        let svc = service();
        assert!(matches!(
            svc.approve_response("rsp-x").await,
            Err(ReplyrError::ResponseNotFound(_))
        ));
        assert!(matches!(svc.reject_response("rsp-x"), Err(ReplyrError::ResponseNotFound(_))));
    }
}
