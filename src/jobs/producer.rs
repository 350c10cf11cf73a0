//! Audited enqueue helpers

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::errors::JobResult;
use super::payload::{ExplainRecomputeJob, Job, JobOptions, TenantRefreshJob};
use super::queue::JobQueue;
use crate::context::RequestContext;
use crate::observability::{AuditEvent, AuditEventType, Auditor};

pub const AI_JOBS_CLIENT: &str = "ai-jobs-producer";
pub const OPS_JOBS_CLIENT: &str = "ops-jobs-producer";

#[derive(Clone)]
pub struct JobProducer {
    queue: Arc<dyn JobQueue>,
    auditor: Auditor,
}

impl JobProducer {
    pub fn new(queue: Arc<dyn JobQueue>, auditor: Auditor) -> Self {
        Self { queue, auditor }
    }

    /// Enqueue an explanation recompute and audit AI_JOB_ENQUEUED
    pub async fn enqueue_explain_recompute(
        &self,
        ctx: &RequestContext,
        job: ExplainRecomputeJob,
    ) -> JobResult<Uuid> {
        let name = job.name();
        let entity = job.entity.clone();
        let mut payload = json!({
            "queue": name.queue(),
            "job": name.as_str(),
            "entity": entity,
            "factHash": job.fact_hash,
            "audience": job.audience,
            "verbosity": job.verbosity.as_str(),
        });

        let id = self
            .queue
            .enqueue(Job::ExplainRecompute(job), JobOptions::EXPLAIN_RECOMPUTE)
            .await?;

        payload["jobId"] = json!(id);
        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                AI_JOBS_CLIENT,
                AuditEventType::AiJobEnqueued,
                format!("{} explanation job enqueued", entity.domain().as_str()),
            )
            .with_evidence(entity.evidence_ref())
            .with_payload(payload),
        )?;

        tracing::debug!(job = %name, %id, entity = %entity, "explain job enqueued");
        Ok(id)
    }

    /// Enqueue a tenant refresh and audit OPS_JOB_ENQUEUED
    pub async fn enqueue_tenant_refresh(&self, ctx: &RequestContext, job: TenantRefreshJob) -> JobResult<Uuid> {
        let reason = job.reason;
        let tenant_id = job.tenant_id.clone();
        let job = Job::TenantRefresh(job);
        let options = JobOptions::for_job(&job);
        let name = job.name();

        let id = self.queue.enqueue(job, options).await?;

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                OPS_JOBS_CLIENT,
                AuditEventType::OpsJobEnqueued,
                format!("Tenant refresh enqueued: {}", reason.as_str()),
            )
            .with_evidence(&tenant_id)
            .with_payload(json!({
                "queue": name.queue(),
                "job": name.as_str(),
                "jobId": id,
                "reason": reason.as_str(),
            })),
        )?;

        tracing::debug!(job = %name, %id, tenant_id = %tenant_id, "tenant refresh enqueued");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::EntityRef;
    use crate::gateway::Verbosity;
    use crate::jobs::payload::RefreshReason;
    use crate::jobs::queue::MemoryJobQueue;
    use crate::observability::MemoryAuditSink;

    #[tokio::test]
    async fn test_enqueue_is_audited() {
        let audit = Arc::new(MemoryAuditSink::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let producer = JobProducer::new(queue.clone(), Auditor::new(audit.clone()));
        let ctx = RequestContext::new("t1").unwrap();

        producer
            .enqueue_explain_recompute(
                &ctx,
                ExplainRecomputeJob::new(&ctx, EntityRef::covenant("L1", "C1"), "h1", "TRADING_ANALYST", Verbosity::Standard),
            )
            .await
            .unwrap();
        producer
            .enqueue_tenant_refresh(&ctx, TenantRefreshJob::new("t1", RefreshReason::Manual))
            .await
            .unwrap();

        let ai = audit.of_type(AuditEventType::AiJobEnqueued);
        assert_eq!(ai.len(), 1);
        assert_eq!(ai[0].payload["job"], "COVENANT_EXPLAIN_RECOMPUTE");
        assert_eq!(ai[0].evidence_ref.as_deref(), Some("L1"));

        let ops = audit.of_type(AuditEventType::OpsJobEnqueued);
        assert_eq!(ops[0].payload["reason"], "MANUAL");
        assert_eq!(queue.records().len(), 2);
    }
}
