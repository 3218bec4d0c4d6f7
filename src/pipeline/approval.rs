//! Approval actions on pending responses.
//!
//! Both actions only apply to `pending` responses. The status change is a
//! compare-and-set against `pending`, so two concurrent approvals of the same
//! response send at most once.
//!
//! An approved send counts against the same caps as an automatic one. It
//! takes the integration's run lease for the quota check and the send, so it
//! cannot race a run (or another approval) past the hourly or daily cap.

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::domain::{Comment, Integration, Policy, Response, ResponseStatus};
use crate::error::{ReplyrError, Result};
use crate::pipeline::lease::{RunClock, RunLease};
use crate::pipeline::runner::{RunPipeline, SEND_TIMEOUT_DETAIL};
use crate::ports::SourcePort;
use crate::quota::{QuotaCaps, QuotaLedger};

fn not_pending(response: &Response, to: ResponseStatus) -> ReplyrError {
    ReplyrError::InvalidTransition {
        from: response.status.to_string(),
        to: to.to_string(),
    }
}

impl RunPipeline {
    /// Send a held reply. Ends `sent` or `failed`.
    ///
    /// Fails with `QuotaExceeded` (response left `pending`) when the send would
    /// break a plan or policy cap, and with `Conflict` while a run holds the
    /// integration's lease.
    pub async fn approve_response(&self, response_id: &str) -> Result<Response> {
        let response = self
            .store
            .get_response(response_id)?
            .ok_or_else(|| ReplyrError::ResponseNotFound(response_id.to_string()))?;
        if response.status != ResponseStatus::Pending {
            return Err(not_pending(&response, ResponseStatus::Sent));
        }

        let comment = self
            .store
            .get_comment(&response.comment_id)?
            .ok_or_else(|| ReplyrError::CommentNotFound(response.comment_id.clone()))?;
        let integration = self
            .store
            .get_integration(&comment.integration_id)?
            .ok_or_else(|| ReplyrError::IntegrationNotFound(comment.integration_id.clone()))?;
        let connector = self
            .sources
            .get(integration.platform)
            .ok_or_else(|| ReplyrError::PlatformNotSupported(integration.platform.to_string()))?;

        let credentials = self.credentials.get_credentials(&integration.id)?;
        let source = connector.connect(&credentials)?;

        let now = Utc::now();
        let clock = RunClock::starting_at(now);
        let Some(_lease) = RunLease::acquire(self.store.clone(), &integration.id, self.config.lease_ttl, clock)? else {
            return Err(ReplyrError::Conflict(format!(
                "a run is in progress for integration {}",
                integration.id
            )));
        };

        self.check_send_quota(&integration, now)?;
        self.send_approved(response, &comment, source.as_ref(), clock).await
    }

    fn check_send_quota(&self, integration: &Integration, now: DateTime<Utc>) -> Result<()> {
        let Some(plan) = self.store.get_tenant(&integration.tenant_id)?.and_then(|t| t.plan) else {
            return Err(ReplyrError::QuotaExceeded(format!(
                "tenant {} has no active plan",
                integration.tenant_id
            )));
        };
        let policy = self.store.get_policy(&integration.id)?.unwrap_or_default();

        let caps = QuotaCaps::new(plan.max_responses_per_day, &policy);
        let snapshot = QuotaLedger::new(self.store.as_ref()).snapshot(integration, caps, now)?;
        if let Some(gated) = snapshot.send_gate() {
            tracing::info!(
                integration_id = %integration.id,
                sent_this_hour = snapshot.sent_this_hour,
                outcome = gated.as_str(),
                "Approval blocked by quota"
            );
            return Err(ReplyrError::QuotaExceeded(gated.to_string()));
        }
        Ok(())
    }

    async fn send_approved(
        &self,
        mut response: Response,
        comment: &Comment,
        source: &dyn SourcePort,
        clock: RunClock,
    ) -> Result<Response> {
        let response_id = response.id.clone();
        response.transition(ResponseStatus::Sending)?;
        if !self.store.update_response_if(&response, ResponseStatus::Pending)? {
            let current = self
                .store
                .get_response(&response_id)?
                .ok_or_else(|| ReplyrError::ResponseNotFound(response_id.clone()))?;
            return Err(not_pending(&current, ResponseStatus::Sent));
        }

        match timeout(self.config.send_timeout, source.send_reply(&comment.external_id, &response.text)).await {
            Ok(Ok(())) => response.mark_sent(clock.now_ms())?,
            Ok(Err(e)) => {
                tracing::warn!(response_id = %response_id, error = %e, "Approved reply failed to send");
                response.mark_failed(e.to_string())?;
            }
            Err(_) => response.mark_failed(SEND_TIMEOUT_DETAIL)?,
        }
        if !self.store.update_response_if(&response, ResponseStatus::Sending)? {
            tracing::warn!(response_id = %response_id, "Response resolved elsewhere during send");
            return self
                .store
                .get_response(&response_id)?
                .ok_or(ReplyrError::ResponseNotFound(response_id));
        }

        tracing::info!(response_id = %response_id, status = %response.status, "Approval processed");
        Ok(response)
    }

    /// Discard a held reply
    pub fn reject_response(&self, response_id: &str) -> Result<Response> {
        let mut response = self
            .store
            .get_response(response_id)?
            .ok_or_else(|| ReplyrError::ResponseNotFound(response_id.to_string()))?;
        if response.status != ResponseStatus::Pending {
            return Err(not_pending(&response, ResponseStatus::Rejected));
        }

        response.transition(ResponseStatus::Rejected)?;
        if !self.store.update_response_if(&response, ResponseStatus::Pending)? {
            return Err(ReplyrError::InvalidTransition {
                from: "pending".to_string(),
                to: ResponseStatus::Rejected.to_string(),
            });
        }

        tracing::info!(response_id, "Response rejected");
        Ok(response)
    }
}
