//! The per-integration run pipeline.
//!
//! One call to [`RunPipeline::run`] walks a fixed sequence of checkpoints:
//!
//! 1. load integration, plan and policy
//! 2. working-hours gate
//! 3. take the per-integration lease (renewed by a heartbeat until the run ends)
//! 4. resolve stale in-flight sends left by a crashed run
//! 5. quota gate and run budget
//! 6. connect to the source and fetch one bounded batch
//! 7. per candidate: lease check, dedup, blacklist, classify, category skip,
//!    generate, record, send
//! 8. stamp last-run and release the lease
//!
//! Errors before the candidate loop propagate to the task runner, which
//! retries the whole run. Errors inside the loop become `failed` responses
//! and never abort the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::credentials::CredentialStore;
use crate::dedup::DedupIndex;
use crate::domain::{
    Category, Comment, Integration, Plan, Policy, RawComment, Response, ResponseStatus, RunOutcome, RunSummary,
};
use crate::error::{ReplyrError, Result};
use crate::filter::{Decision, PolicyFilter, SkipReason};
use crate::llm::LlmError;
use crate::pipeline::lease::{RunClock, RunLease};
use crate::pipeline::pacing::SendPacer;
use crate::pipeline::recovery;
use crate::ports::{ClassifierPort, ReplyRequest, ResponderPort, SourceError, SourcePort};
use crate::quota::{QuotaCaps, QuotaLedger};
use crate::source::SourceRegistry;
use crate::storage::Store;

/// Detail recorded when a send call exceeds its timeout
pub const SEND_TIMEOUT_DETAIL: &str = "send timed out; delivery outcome unknown";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Comments requested per fetch
    pub fetch_batch_size: u32,
    /// Minimum spacing between sends
    pub send_interval: Duration,
    /// Lease lifetime; also the age after which a `sending` marker is stale
    pub lease_ttl: Duration,
    pub fetch_timeout: Duration,
    pub send_timeout: Duration,
    pub classify_timeout: Duration,
    pub generate_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_batch_size: 50,
            send_interval: Duration::from_secs(2),
            lease_ttl: Duration::from_secs(15 * 60),
            fetch_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            classify_timeout: Duration::from_secs(30),
            generate_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    fn lease_ttl_ms(&self) -> i64 {
        self.lease_ttl.as_millis() as i64
    }
}

/// What happened to one fetched comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Duplicate,
    Discarded,
    Skipped,
    Pending,
    Sent,
    Failed,
}

fn tally(summary: &mut RunSummary, candidate: Candidate) {
    match candidate {
        Candidate::Duplicate => summary.duplicates += 1,
        Candidate::Discarded => summary.discarded += 1,
        Candidate::Skipped => summary.skipped += 1,
        Candidate::Pending => summary.pending += 1,
        Candidate::Sent => summary.responded += 1,
        Candidate::Failed => summary.failed += 1,
    }
}

/// Everything a run needs, injected once at wiring time
pub struct RunPipeline {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) sources: Arc<SourceRegistry>,
    pub(crate) classifier: Arc<dyn ClassifierPort>,
    pub(crate) responder: Arc<dyn ResponderPort>,
    pub(crate) config: PipelineConfig,
}

impl RunPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<dyn CredentialStore>,
        sources: Arc<SourceRegistry>,
        classifier: Arc<dyn ClassifierPort>,
        responder: Arc<dyn ResponderPort>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            sources,
            classifier,
            responder,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one integration now
    pub async fn run(&self, integration_id: &str) -> Result<RunOutcome> {
        self.run_at(integration_id, Utc::now()).await
    }

    /// Run with an explicit clock reading for the schedule and quota gates
    pub async fn run_at(&self, integration_id: &str, now: DateTime<Utc>) -> Result<RunOutcome> {
        let Some(integration) = self.store.get_enabled_integration(integration_id)? else {
            tracing::info!(integration_id, "Integration missing or disabled");
            return Ok(RunOutcome::IntegrationNotFound);
        };

        let Some(plan) = self.store.get_tenant(&integration.tenant_id)?.and_then(|t| t.plan) else {
            tracing::info!(integration_id, tenant_id = %integration.tenant_id, "Tenant has no active plan");
            return Ok(RunOutcome::NoPlan);
        };

        let Some(policy) = self.store.get_policy(integration_id)? else {
            tracing::info!(integration_id, "Integration has no policy");
            return Ok(RunOutcome::NoConfig);
        };

        if !policy.working_hours.contains(now) {
            tracing::debug!(integration_id, "Outside working hours");
            return Ok(RunOutcome::OutsideWorkingHours);
        }

        let clock = RunClock::starting_at(now);
        let Some(lease) = RunLease::acquire(self.store.clone(), integration_id, self.config.lease_ttl, clock)? else {
            tracing::info!(integration_id, "Another run holds the lease");
            return Ok(RunOutcome::AlreadyRunning);
        };
        tracing::debug!(integration_id, holder = lease.holder(), "Run lease acquired");

        let result = self.run_leased(&integration, &plan, &policy, now, clock, &lease).await;
        drop(lease);

        let outcome = result?;
        tracing::info!(integration_id, outcome = %outcome, "Run finished");
        Ok(outcome)
    }

    async fn run_leased(
        &self,
        integration: &Integration,
        plan: &Plan,
        policy: &Policy,
        now: DateTime<Utc>,
        clock: RunClock,
        lease: &RunLease,
    ) -> Result<RunOutcome> {
        let stale_before = clock.now_ms() - self.config.lease_ttl_ms();
        recovery::resolve_stale_sends(self.store.as_ref(), &integration.id, stale_before)?;

        let caps = QuotaCaps::new(plan.max_responses_per_day, policy);
        let snapshot = QuotaLedger::new(self.store.as_ref()).snapshot(integration, caps, now)?;
        if let Some(gated) = snapshot.gate() {
            tracing::info!(
                integration_id = %integration.id,
                tenant_sent_today = snapshot.tenant_sent_today,
                sent_this_hour = snapshot.sent_this_hour,
                outcome = gated.as_str(),
                "Quota gate closed"
            );
            return Ok(gated);
        }
        let budget = snapshot.run_budget();

        let Some(connector) = self.sources.get(integration.platform) else {
            self.store.touch_last_run(&integration.id, clock.now_ms())?;
            return Ok(RunOutcome::PlatformNotSupported {
                platform: integration.platform.to_string(),
            });
        };

        let credentials = match self.credentials.get_credentials(&integration.id) {
            Ok(credentials) => credentials,
            Err(ReplyrError::Credentials(error)) => {
                tracing::warn!(integration_id = %integration.id, error = %error, "Credentials unusable");
                return Ok(RunOutcome::InvalidCredentials { error });
            }
            Err(e) => return Err(e),
        };

        let source = match connector.connect(&credentials) {
            Ok(source) => source,
            Err(SourceError::Unauthorized(error)) => return Ok(RunOutcome::InvalidCredentials { error }),
            Err(e) => return Ok(RunOutcome::SourceApiError { error: e.to_string() }),
        };

        let fetched = match timeout(
            self.config.fetch_timeout,
            source.fetch_recent_comments(&integration.channel_id, self.config.fetch_batch_size),
        )
        .await
        {
            Ok(Ok(comments)) => comments,
            Ok(Err(SourceError::Unauthorized(error))) => return Ok(RunOutcome::InvalidCredentials { error }),
            Ok(Err(e)) => {
                tracing::warn!(integration_id = %integration.id, error = %e, "Fetch failed");
                self.store.touch_last_run(&integration.id, clock.now_ms())?;
                return Ok(RunOutcome::SourceApiError { error: e.to_string() });
            }
            Err(_) => {
                tracing::warn!(integration_id = %integration.id, "Fetch timed out");
                self.store.touch_last_run(&integration.id, clock.now_ms())?;
                return Ok(RunOutcome::SourceApiError {
                    error: format!("fetch timed out after {:?}", self.config.fetch_timeout),
                });
            }
        };

        tracing::info!(
            integration_id = %integration.id,
            fetched = fetched.len(),
            budget,
            "Processing candidates"
        );

        let mut summary = RunSummary::default();
        let mut dedup = DedupIndex::new(self.store.as_ref());
        let filter = PolicyFilter::new(policy);
        let mut pacer = SendPacer::new(self.config.send_interval);

        for raw in &fetched {
            if summary.budget_used() >= budget {
                tracing::debug!(integration_id = %integration.id, "Run budget used up");
                break;
            }
            if !lease.renew() {
                tracing::warn!(integration_id = %integration.id, "Run lease lost, stopping early");
                break;
            }

            let candidate = self
                .process_candidate(integration, policy, raw, &dedup, &filter, &mut pacer, source.as_ref(), clock)
                .await;

            match candidate {
                Ok(candidate) => tally(&mut summary, candidate),
                Err(e) => {
                    tracing::warn!(
                        integration_id = %integration.id,
                        external_id = %raw.external_id,
                        error = %e,
                        "Candidate could not be recorded"
                    );
                    summary.failed += 1;
                }
            }
            dedup.mark(&raw.external_id);
        }

        self.store.touch_last_run(&integration.id, clock.now_ms())?;
        Ok(RunOutcome::Completed(summary))
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_candidate(
        &self,
        integration: &Integration,
        policy: &Policy,
        raw: &RawComment,
        dedup: &DedupIndex<'_>,
        filter: &PolicyFilter<'_>,
        pacer: &mut SendPacer,
        source: &dyn SourcePort,
        clock: RunClock,
    ) -> Result<Candidate> {
        if dedup.exists(&raw.external_id)? {
            return Ok(Candidate::Duplicate);
        }

        if let Decision::Skip(reason) = filter.check_text(&raw.text) {
            tracing::debug!(external_id = %raw.external_id, reason = ?reason, "Blacklisted, discarding");
            return Ok(Candidate::Discarded);
        }

        let category = match timeout(self.config.classify_timeout, self.classifier.classify(&raw.text)).await {
            Ok(category) => category,
            Err(_) => {
                tracing::warn!(external_id = %raw.external_id, "Classification timed out, using neutral");
                Category::Neutral
            }
        };

        let comment = Comment::from_raw(&integration.id, raw, Some(category));

        match filter.decide(&raw.text, category) {
            Decision::Process => {}
            Decision::Skip(SkipReason::Category(skipped)) => {
                tracing::debug!(external_id = %raw.external_id, category = %skipped, "Category skipped by policy");
                let response = Response::skipped(&comment.id);
                return self.record(&comment, &response, Candidate::Skipped);
            }
            Decision::Skip(SkipReason::Blacklisted(_)) => return Ok(Candidate::Discarded),
        }

        // Unsafe categories the policy lets through are declined by the responder
        let request = ReplyRequest::new(&raw.text, category, policy);
        let generated = match timeout(self.config.generate_timeout, self.responder.generate_reply(&request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.config.generate_timeout)),
        };

        let reply = match generated {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                tracing::debug!(external_id = %raw.external_id, category = %category, "No reply, discarding");
                return Ok(Candidate::Discarded);
            }
            Err(e) => {
                let response = Response::failed(&comment.id, format!("reply generation failed: {}", e));
                return self.record(&comment, &response, Candidate::Failed);
            }
        };

        if policy.approval_required {
            let response = Response::pending(&comment.id, &reply.text, Some(reply.model), reply.tokens_used);
            return self.record(&comment, &response, Candidate::Pending);
        }

        let mut response = Response::sending(&comment.id, &reply.text, Some(reply.model), reply.tokens_used);
        if !self.store.record_comment(&comment, &response)? {
            return Ok(Candidate::Duplicate);
        }

        pacer.wait().await;
        pacer.record_attempt();

        let candidate = match timeout(self.config.send_timeout, source.send_reply(&raw.external_id, &response.text)).await
        {
            Ok(Ok(())) => {
                pacer.record_success();
                response.mark_sent(clock.now_ms())?;
                Candidate::Sent
            }
            Ok(Err(e)) => {
                if let Some(retry_after) = e.retry_after() {
                    pacer.record_rate_limit(retry_after);
                }
                tracing::warn!(external_id = %raw.external_id, error = %e, "Send failed");
                response.mark_failed(e.to_string())?;
                Candidate::Failed
            }
            Err(_) => {
                tracing::warn!(external_id = %raw.external_id, "Send timed out");
                response.mark_failed(SEND_TIMEOUT_DETAIL)?;
                Candidate::Failed
            }
        };
        if !self.store.update_response_if(&response, ResponseStatus::Sending)? {
            tracing::warn!(
                external_id = %raw.external_id,
                response_id = %response.id,
                "Sending marker resolved elsewhere, keeping stored outcome"
            );
            return Ok(Candidate::Failed);
        }

        Ok(candidate)
    }

    /// Commit comment + response; a lost race on the external id counts as a duplicate
    fn record(&self, comment: &Comment, response: &Response, on_insert: Candidate) -> Result<Candidate> {
        if self.store.record_comment(comment, response)? {
            Ok(on_insert)
        } else {
            Ok(Candidate::Duplicate)
        }
    }
}
