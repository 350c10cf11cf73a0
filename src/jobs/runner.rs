//! # Job Runner
//!
//! Worker loop over both queues. Explanation jobs go through the
//! explainability service (which audits its own cache traffic); tenant
//! refresh jobs recompute the portfolio, then every loan's readiness,
//! covenants and KPIs, with drift follow-ups enqueued as they occur.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use super::errors::JobResult;
use super::payload::{ExplainRecomputeJob, Job, TenantRefreshJob, AI_EXPLAIN_QUEUE, OPS_QUEUE};
use super::queue::{JobQueue, JobRecord, JobState};
use super::recompute::Recomputer;
use crate::context::RequestContext;
use crate::explain::{ExplainRequest, ExplainabilityService};
use crate::facts::EntityRef;
use crate::observability::{AuditEvent, AuditEventType, Auditor};

const AI_WORKER_CLIENT: &str = "ai-explain-worker";
const OPS_WORKER_CLIENT: &str = "ops-worker";

/// Idle wait between empty polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Counts reported by a tenant refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStats {
    pub portfolio_refreshed: bool,
    pub loans_refreshed: usize,
    pub covenants_refreshed: usize,
    pub kpis_refreshed: usize,
    pub drifted: usize,
}

/// Outcome of one processed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processed {
    pub id: Uuid,
    pub state: JobState,
}

pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    recomputer: Recomputer,
    explain: Arc<ExplainabilityService>,
    auditor: Auditor,
    poll_interval: Duration,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        recomputer: Recomputer,
        explain: Arc<ExplainabilityService>,
        auditor: Auditor,
    ) -> Self {
        Self {
            queue,
            recomputer,
            explain,
            auditor,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Process jobs until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("job runner started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.drain().await {
                Ok(0) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "job queue error");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        tracing::info!("job runner stopped");
    }

    /// Process every currently due job; returns how many ran.
    /// Ops jobs go first so their drift follow-ups land in the same drain.
    pub async fn drain(&self) -> JobResult<usize> {
        let mut processed = 0;
        loop {
            let ops = self.run_once(OPS_QUEUE).await?;
            let ai = self.run_once(AI_EXPLAIN_QUEUE).await?;
            match (ops, ai) {
                (None, None) => return Ok(processed),
                (a, b) => processed += usize::from(a.is_some()) + usize::from(b.is_some()),
            }
        }
    }

    /// Claim and run one due job of `queue`
    #[instrument(skip(self))]
    pub async fn run_once(&self, queue: &str) -> JobResult<Option<Processed>> {
        let Some(record) = self.queue.claim(queue).await? else {
            return Ok(None);
        };

        let state = match self.process(&record).await {
            Ok(()) => {
                self.queue.complete(record.id).await?;
                JobState::Completed
            }
            Err(e) => {
                let state = self.queue.fail(record.id, e.to_string()).await?;
                tracing::warn!(
                    job = %record.job.name(),
                    id = %record.id,
                    attempt = record.attempts_made,
                    max_attempts = record.options.attempts,
                    retrying = state == JobState::Waiting,
                    error = %e,
                    "job run failed"
                );
                state
            }
        };

        Ok(Some(Processed { id: record.id, state }))
    }

    async fn process(&self, record: &JobRecord) -> JobResult<()> {
        let ctx = record.job.context()?;
        match &record.job {
            Job::ExplainRecompute(job) => self.run_explain(&ctx, record, job).await,
            Job::TenantRefresh(job) => self.run_refresh(&ctx, record, job).await,
        }
    }

    async fn run_explain(&self, ctx: &RequestContext, record: &JobRecord, job: &ExplainRecomputeJob) -> JobResult<()> {
        let base = json!({
            "queue": AI_EXPLAIN_QUEUE,
            "job": job.name().as_str(),
            "jobId": record.id,
            "attempt": record.attempts_made,
            "factHash": job.fact_hash,
        });
        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                AI_WORKER_CLIENT,
                AuditEventType::AiJobStarted,
                format!("{} explanation job started", job.entity.domain().as_str()),
            )
            .with_evidence(job.entity.evidence_ref())
            .with_payload(base.clone()),
        )?;

        let request = ExplainRequest::new(job.entity.clone())
            .with_fact_hash(job.fact_hash.clone())
            .with_audience(job.audience.clone())
            .with_verbosity(job.verbosity);

        match self.explain.explain(ctx, request).await {
            Ok(response) => {
                let mut payload = base;
                payload["cached"] = json!(response.cached);
                payload["explanationHash"] = json!(response.record.explanation_hash);
                payload["backend"] = json!(response.record.backend);
                self.auditor.record(
                    AuditEvent::for_request(
                        ctx,
                        AI_WORKER_CLIENT,
                        AuditEventType::AiJobCompleted,
                        format!("{} explanation job completed", job.entity.domain().as_str()),
                    )
                    .with_evidence(job.entity.evidence_ref())
                    .with_payload(payload),
                )?;
                Ok(())
            }
            Err(e) => {
                let mut payload = base;
                payload["error"] = json!(e.to_string());
                self.auditor.record_on_failure(
                    AuditEvent::for_request(
                        ctx,
                        AI_WORKER_CLIENT,
                        AuditEventType::AiJobFailed,
                        format!("{} explanation job failed", job.entity.domain().as_str()),
                    )
                    .with_evidence(job.entity.evidence_ref())
                    .with_payload(payload),
                );
                Err(e.into())
            }
        }
    }

    async fn run_refresh(&self, ctx: &RequestContext, record: &JobRecord, job: &TenantRefreshJob) -> JobResult<()> {
        let base = json!({
            "queue": OPS_QUEUE,
            "job": record.job.name().as_str(),
            "jobId": record.id,
            "attempt": record.attempts_made,
            "reason": job.reason.as_str(),
        });
        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                OPS_WORKER_CLIENT,
                AuditEventType::OpsJobStarted,
                format!("Tenant refresh started: {}", job.reason.as_str()),
            )
            .with_evidence(&job.tenant_id)
            .with_payload(base.clone()),
        )?;

        let mut stats = RefreshStats::default();
        match self.refresh_tenant(ctx, &mut stats).await {
            Ok(()) => {
                let mut payload = base;
                payload["stats"] = json!(stats);
                self.auditor.record(
                    AuditEvent::for_request(
                        ctx,
                        OPS_WORKER_CLIENT,
                        AuditEventType::OpsJobCompleted,
                        format!(
                            "Tenant refresh completed: {} loans, {} covenants, {} KPIs",
                            stats.loans_refreshed, stats.covenants_refreshed, stats.kpis_refreshed
                        ),
                    )
                    .with_evidence(&job.tenant_id)
                    .with_payload(payload),
                )?;
                tracing::info!(tenant_id = %job.tenant_id, ?stats, "tenant refresh completed");
                Ok(())
            }
            Err(e) => {
                let mut payload = base;
                payload["stats"] = json!(stats);
                payload["error"] = json!(e.to_string());
                self.auditor.record_on_failure(
                    AuditEvent::for_request(
                        ctx,
                        OPS_WORKER_CLIENT,
                        AuditEventType::OpsJobFailed,
                        format!("Tenant refresh failed: {}", e),
                    )
                    .with_evidence(&job.tenant_id)
                    .with_payload(payload),
                );
                Err(e)
            }
        }
    }

    /// Portfolio first, then each loan's readiness, covenants and KPIs.
    /// The tenant id doubles as the portfolio id.
    async fn refresh_tenant(&self, ctx: &RequestContext, stats: &mut RefreshStats) -> JobResult<()> {
        let portfolio = self
            .recomputer
            .recompute(ctx, &EntityRef::portfolio(ctx.tenant_id()))
            .await?;
        stats.portfolio_refreshed = true;
        stats.drifted += usize::from(portfolio.outcome.drifted);

        let loans = self.recomputer.facts().loans(ctx).await?;
        for loan in &loans {
            let readiness = self.recomputer.recompute(ctx, &EntityRef::loan(&loan.id)).await?;
            stats.drifted += usize::from(readiness.outcome.drifted);
            stats.loans_refreshed += 1;

            for covenant in &loan.covenants {
                let out = self
                    .recomputer
                    .recompute(ctx, &EntityRef::covenant(&loan.id, &covenant.id))
                    .await?;
                stats.drifted += usize::from(out.outcome.drifted);
                stats.covenants_refreshed += 1;
            }

            for kpi in &loan.kpis {
                let out = self.recomputer.recompute(ctx, &EntityRef::kpi(&loan.id, &kpi.id)).await?;
                stats.drifted += usize::from(out.outcome.drifted);
                stats.kpis_refreshed += 1;
            }
        }
        Ok(())
    }
}
