//! # Impact Propagator
//!
//! Source mutation in, tenant refresh out. The refresh recomputes every
//! domain; drift then drives explanation recompute on its own.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::errors::{ImpactError, ImpactResult};
use super::event::{ImpactEvent, ImpactSource, ImpactStore, SourceType};
use crate::context::RequestContext;
use crate::jobs::{JobProducer, RefreshReason, TenantRefreshJob};
use crate::observability::{AuditEvent, AuditEventType, Auditor};

pub const IMPACT_CLIENT: &str = "impact-detection-service";

pub struct ImpactPropagator {
    store: Arc<dyn ImpactStore>,
    producer: JobProducer,
    auditor: Auditor,
}

impl ImpactPropagator {
    pub fn new(store: Arc<dyn ImpactStore>, producer: JobProducer, auditor: Auditor) -> Self {
        Self {
            store,
            producer,
            auditor,
        }
    }

    /// Persist the impact decision, audit it and enqueue a MANUAL tenant
    /// refresh. Returns the impact event id.
    pub async fn on_source_changed(
        &self,
        ctx: &RequestContext,
        source: ImpactSource,
        loan_id: Option<String>,
    ) -> ImpactResult<Uuid> {
        if source.id.trim().is_empty() {
            return Err(ImpactError::Validation("source id must not be empty".into()));
        }
        if loan_id.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(ImpactError::Validation("loan id must not be empty".into()));
        }

        let event = ImpactEvent::detect(
            ctx.tenant_id(),
            source,
            loan_id,
            ctx.correlation_id().map(str::to_string),
        );
        let id = event.id;
        self.store.insert(event.clone()).await?;

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                IMPACT_CLIENT,
                AuditEventType::ImpactDetected,
                format!(
                    "Impact detected: {} {} affects {} targets",
                    event.source.source_type,
                    event.source.action.as_str(),
                    event.targets.len()
                ),
            )
            .with_evidence(&event.source.id)
            .with_payload(json!({
                "impactEventId": id,
                "sourceType": event.source.source_type,
                "sourceId": event.source.id,
                "sourceAction": event.source.action,
                "loanId": event.loan_id,
                "targets": event.targets,
                "reasonCodes": event.reason_codes,
            })),
        )?;

        let job = TenantRefreshJob::new(ctx.tenant_id(), RefreshReason::Manual)
            .with_correlation(ctx.correlation_id().map(str::to_string));
        self.producer.enqueue_tenant_refresh(ctx, job).await?;

        tracing::info!(
            impact_id = %id,
            source = %event.source.source_type,
            source_id = %event.source.id,
            targets = event.targets.len(),
            "impact detected"
        );
        Ok(id)
    }

    pub async fn events_for_loan(
        &self,
        ctx: &RequestContext,
        loan_id: &str,
        limit: usize,
    ) -> ImpactResult<Vec<ImpactEvent>> {
        self.store.by_loan(ctx.tenant_id(), loan_id, limit).await
    }

    pub async fn events_for_source(
        &self,
        ctx: &RequestContext,
        source_type: SourceType,
        source_id: &str,
        limit: usize,
    ) -> ImpactResult<Vec<ImpactEvent>> {
        self.store
            .by_source(ctx.tenant_id(), source_type, source_id, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impact::event::{MemoryImpactStore, SourceAction, DEFAULT_LIMIT};
    use crate::jobs::{Job, MemoryJobQueue};
    use crate::observability::MemoryAuditSink;

    fn setup() -> (ImpactPropagator, Arc<MemoryJobQueue>, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let auditor = Auditor::new(audit.clone());
        let queue = Arc::new(MemoryJobQueue::new());
        let propagator = ImpactPropagator::new(
            Arc::new(MemoryImpactStore::new()),
            JobProducer::new(queue.clone(), auditor.clone()),
            auditor,
        );
        (propagator, queue, audit)
    }

    #[tokio::test]
    async fn test_source_change_persists_audits_and_enqueues() {
        let (propagator, queue, audit) = setup();
        let ctx = RequestContext::new("t1").unwrap().with_correlation("req-1");

        let id = propagator
            .on_source_changed(
                &ctx,
                ImpactSource::new(SourceType::Document, "D9", SourceAction::Updated),
                Some("L1".into()),
            )
            .await
            .unwrap();

        let events = propagator.events_for_loan(&ctx, "L1", DEFAULT_LIMIT).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].targets.len(), 4);

        let detected = audit.of_type(AuditEventType::ImpactDetected);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].evidence_ref.as_deref(), Some("D9"));
        assert_eq!(detected[0].payload["sourceAction"], "UPDATED");
        assert_eq!(detected[0].payload["reasonCodes"][1], "DOWNSTREAM_FACTS_MAY_BE_STALE");

        let records = queue.records();
        assert_eq!(records.len(), 1);
        match &records[0].job {
            Job::TenantRefresh(job) => {
                assert_eq!(job.reason, RefreshReason::Manual);
                assert_eq!(job.correlation_id.as_deref(), Some("req-1"));
            }
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_blank_source() {
        let (propagator, queue, audit) = setup();
        let ctx = RequestContext::new("t1").unwrap();
        let err = propagator
            .on_source_changed(
                &ctx,
                ImpactSource::new(SourceType::Amendment, " ", SourceAction::Created),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(queue.records().is_empty());
        assert!(audit.is_empty());
    }
}
