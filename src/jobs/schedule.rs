//! # Nightly Refresh Schedule
//!
//! Cron-driven producer of SCHEDULED tenant refresh jobs.

use chrono::{DateTime, Utc};
use croner::Cron;
use tokio::sync::watch;
use uuid::Uuid;

use super::errors::{JobError, JobResult};
use super::payload::{RefreshReason, TenantRefreshJob};
use super::producer::JobProducer;
use crate::context::RequestContext;

/// 02:00 UTC every day
pub const NIGHTLY_REFRESH_CRON: &str = "0 2 * * *";

#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    expr: String,
    cron: Cron,
    tenants: Vec<String>,
}

impl RefreshSchedule {
    pub fn new(expr: impl Into<String>, tenants: Vec<String>) -> JobResult<Self> {
        let expr = expr.into();
        let cron = Cron::new(&expr)
            .parse()
            .map_err(|e| JobError::InvalidCron(format!("{}: {}", expr, e)))?;
        Ok(Self { expr, cron, tenants })
    }

    pub fn nightly(tenants: Vec<String>) -> JobResult<Self> {
        Self::new(NIGHTLY_REFRESH_CRON, tenants)
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn tenants(&self) -> &[String] {
        &self.tenants
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> JobResult<DateTime<Utc>> {
        self.cron
            .find_next_occurrence(&after, false)
            .map_err(|e| JobError::InvalidCron(format!("{}: {}", self.expr, e)))
    }

    /// Enqueue one scheduled refresh per tenant
    pub async fn fire(&self, producer: &JobProducer) -> JobResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(self.tenants.len());
        for tenant in &self.tenants {
            let ctx = RequestContext::new(tenant)?;
            let job = TenantRefreshJob::new(tenant, RefreshReason::Scheduled);
            ids.push(producer.enqueue_tenant_refresh(&ctx, job).await?);
        }
        tracing::info!(tenants = self.tenants.len(), "scheduled tenant refresh fired");
        Ok(ids)
    }

    /// Sleep until each fire time and enqueue, until `shutdown` flips
    pub async fn run(&self, producer: JobProducer, mut shutdown: watch::Receiver<bool>) -> JobResult<()> {
        tracing::info!(cron = %self.expr, tenants = self.tenants.len(), "refresh schedule started");
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let now = Utc::now();
            let next = self.next_after(now)?;
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next = %next, "next scheduled refresh");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.fire(&producer).await {
                        tracing::error!(error = %e, "scheduled refresh failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::payload::{Job, JobOptions, OPS_QUEUE};
    use crate::jobs::queue::{JobState, MemoryJobQueue};
    use crate::observability::{AuditEventType, Auditor, MemoryAuditSink};
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_next_nightly_occurrence() {
        let schedule = RefreshSchedule::nightly(vec![]).unwrap();

        let before = Utc.with_ymd_and_hms(2026, 3, 10, 1, 30, 0).unwrap();
        assert_eq!(
            schedule.next_after(before).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap()
        );

        // exactly on the fire time moves to the next day
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(at).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_cron() {
        let err = RefreshSchedule::new("not a cron", vec![]).unwrap_err();
        assert!(matches!(err, JobError::InvalidCron(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_fire_enqueues_scheduled_refresh_per_tenant() {
        let audit = Arc::new(MemoryAuditSink::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let producer = JobProducer::new(queue.clone(), Auditor::new(audit.clone()));
        let schedule = RefreshSchedule::nightly(vec!["t1".into(), "t2".into()]).unwrap();

        let ids = schedule.fire(&producer).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(queue.count(OPS_QUEUE, JobState::Waiting), 2);

        for record in queue.records() {
            assert_eq!(record.options, JobOptions::SCHEDULED_REFRESH);
            assert!(matches!(
                record.job,
                Job::TenantRefresh(TenantRefreshJob { reason: RefreshReason::Scheduled, .. })
            ));
        }
        let events = audit.of_type(AuditEventType::OpsJobEnqueued);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].tenant_id, "t2");
    }
}
