//! # Fact Service
//!
//! Compute-and-persist for every fact domain:
//! 1. fetch the entity's latest snapshot (before any write)
//! 2. read business state and derive the fact core
//! 3. hash the core and upsert-by-hash
//! 4. compare hashes to decide drift
//! 5. audit FACT_COMPUTED always, FACT_DRIFT_DETECTED only on drift

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use super::errors::{FactError, FactResult};
use super::snapshot::{ComputeOutcome, EntityRef, FactDomain, FactSnapshot, COMPUTED_BY_SYSTEM};
use super::store::FactStore;
use super::{covenant, esg, portfolio, readiness};
use crate::config::FactVersions;
use crate::context::RequestContext;
use crate::hashing;
use crate::observability::{AuditEvent, AuditEventType, Auditor};
use crate::state::{LoanRecord, LoanStateSource};

/// Reason recorded on drift events.
pub const DRIFT_REASON: &str = "FACT_HASH_CHANGED";

/// Fact computation engines over a shared store
pub struct FactService {
    state: Arc<dyn LoanStateSource>,
    store: Arc<dyn FactStore>,
    auditor: Auditor,
    versions: FactVersions,
}

impl FactService {
    pub fn new(
        state: Arc<dyn LoanStateSource>,
        store: Arc<dyn FactStore>,
        auditor: Auditor,
        versions: FactVersions,
    ) -> Self {
        Self {
            state,
            store,
            auditor,
            versions,
        }
    }

    /// Compute and persist facts for any entity
    #[instrument(skip_all, fields(tenant_id = ctx.tenant_id(), entity = %entity))]
    pub async fn compute(&self, ctx: &RequestContext, entity: &EntityRef) -> FactResult<ComputeOutcome> {
        entity.validate()?;
        let tenant_id = ctx.tenant_id();
        let version = self.versions.for_domain(entity.domain());

        let previous = self.store.latest(tenant_id, entity).await?;

        let core = match entity {
            EntityRef::Loan { loan_id } => {
                let loan = self.load_loan(tenant_id, loan_id).await?;
                to_core(&readiness::derive(&loan, version))?
            }
            EntityRef::Covenant {
                loan_id,
                covenant_id,
            } => {
                let loan = self.load_loan(tenant_id, loan_id).await?;
                let record = loan.covenant(covenant_id).ok_or_else(|| FactError::CovenantNotFound {
                    loan_id: loan_id.clone(),
                    covenant_id: covenant_id.clone(),
                })?;
                to_core(&covenant::derive(loan_id, record, version))?
            }
            EntityRef::Kpi { loan_id, kpi_id } => {
                let loan = self.load_loan(tenant_id, loan_id).await?;
                let record = loan.kpi(kpi_id).ok_or_else(|| FactError::KpiNotFound {
                    loan_id: loan_id.clone(),
                    kpi_id: kpi_id.clone(),
                })?;
                to_core(&esg::derive(loan_id, record, version))?
            }
            EntityRef::Portfolio { portfolio_id } => {
                let loans = self.state.loans(tenant_id).await?;
                to_core(&portfolio::derive(portfolio_id, &loans, version))?
            }
        };

        self.persist(ctx, entity, version, core, previous).await
    }

    /// Trading readiness for a loan
    pub async fn compute_readiness(&self, ctx: &RequestContext, loan_id: &str) -> FactResult<ComputeOutcome> {
        self.compute(ctx, &EntityRef::loan(loan_id)).await
    }

    /// Covenant evaluation
    pub async fn compute_covenant(
        &self,
        ctx: &RequestContext,
        loan_id: &str,
        covenant_id: &str,
    ) -> FactResult<ComputeOutcome> {
        self.compute(ctx, &EntityRef::covenant(loan_id, covenant_id)).await
    }

    /// ESG KPI evaluation
    pub async fn compute_kpi(&self, ctx: &RequestContext, loan_id: &str, kpi_id: &str) -> FactResult<ComputeOutcome> {
        self.compute(ctx, &EntityRef::kpi(loan_id, kpi_id)).await
    }

    /// Portfolio rollup
    pub async fn compute_portfolio(&self, ctx: &RequestContext, portfolio_id: &str) -> FactResult<ComputeOutcome> {
        self.compute(ctx, &EntityRef::portfolio(portfolio_id)).await
    }

    /// Latest snapshot for an entity
    pub async fn latest(&self, ctx: &RequestContext, entity: &EntityRef) -> FactResult<Option<FactSnapshot>> {
        entity.validate()?;
        self.store.latest(ctx.tenant_id(), entity).await
    }

    /// Snapshot by hash within a domain
    pub async fn find_by_hash(
        &self,
        ctx: &RequestContext,
        domain: FactDomain,
        fact_hash: &str,
    ) -> FactResult<Option<FactSnapshot>> {
        self.store.find_by_hash(ctx.tenant_id(), domain, fact_hash).await
    }

    /// Every snapshot of an entity, oldest first
    pub async fn history(&self, ctx: &RequestContext, entity: &EntityRef) -> FactResult<Vec<FactSnapshot>> {
        entity.validate()?;
        self.store.history(ctx.tenant_id(), entity).await
    }

    /// Loans of the tenant in context
    pub async fn loans(&self, ctx: &RequestContext) -> FactResult<Vec<LoanRecord>> {
        Ok(self.state.loans(ctx.tenant_id()).await?)
    }

    async fn load_loan(&self, tenant_id: &str, loan_id: &str) -> FactResult<LoanRecord> {
        self.state
            .loan(tenant_id, loan_id)
            .await?
            .ok_or_else(|| FactError::LoanNotFound(loan_id.to_string()))
    }

    async fn persist(
        &self,
        ctx: &RequestContext,
        entity: &EntityRef,
        version: u32,
        core: Value,
        previous: Option<FactSnapshot>,
    ) -> FactResult<ComputeOutcome> {
        let domain = entity.domain();
        let fact_hash = hashing::hash_value(&core);

        let candidate = FactSnapshot {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id().to_string(),
            domain,
            entity: entity.clone(),
            fact_hash: fact_hash.clone(),
            fact_version: version,
            facts: core,
            computed_at: Utc::now(),
            computed_by: COMPUTED_BY_SYSTEM.to_string(),
            correlation_id: ctx.correlation_id().map(str::to_string),
        };
        let candidate_id = candidate.id;
        let snapshot = self.store.upsert(candidate).await?;
        let deduplicated = snapshot.id != candidate_id;

        self.auditor.record(
            AuditEvent::for_request(ctx, domain.client_id(), AuditEventType::FactComputed, domain.computed_summary())
                .with_evidence(entity.evidence_ref())
                .with_payload(json!({
                    "domain": domain.as_str(),
                    "entity": entity,
                    "factHash": fact_hash,
                    "factVersion": version,
                    "snapshotId": snapshot.id,
                    "deduplicated": deduplicated,
                })),
        )?;

        let drifted = previous
            .as_ref()
            .map(|p| p.fact_hash != fact_hash)
            .unwrap_or(false);

        if let (true, Some(prev)) = (drifted, previous.as_ref()) {
            self.auditor.record(
                AuditEvent::for_request(
                    ctx,
                    domain.client_id(),
                    AuditEventType::FactDriftDetected,
                    format!("{} facts drifted", domain.as_str()),
                )
                .with_evidence(entity.evidence_ref())
                .with_payload(json!({
                    "module": domain.module().as_str(),
                    "domain": domain.as_str(),
                    "entity": entity,
                    "prevFactHash": prev.fact_hash,
                    "nextFactHash": fact_hash,
                    "prevComputedAt": prev.computed_at,
                    "nextComputedAt": snapshot.computed_at,
                    "reason": DRIFT_REASON,
                })),
            )?;
            tracing::info!(
                tenant_id = ctx.tenant_id(),
                entity = %entity,
                prev = %prev.fact_hash,
                next = %fact_hash,
                "fact drift detected"
            );
        } else {
            tracing::debug!(tenant_id = ctx.tenant_id(), entity = %entity, deduplicated, "facts computed");
        }

        Ok(ComputeOutcome {
            snapshot,
            drifted,
            prev_fact_hash: previous.as_ref().map(|p| p.fact_hash.clone()),
            prev_computed_at: previous.as_ref().map(|p| p.computed_at),
        })
    }
}

fn to_core<T: Serialize>(core: &T) -> FactResult<Value> {
    serde_json::to_value(core).map_err(|e| FactError::Internal(format!("fact core not serializable: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::MemoryFactStore;
    use crate::observability::MemoryAuditSink;
    use crate::state::{ChecklistCategory, ChecklistItem, ChecklistStatus, MemoryLoanState};

    struct Fixture {
        state: Arc<MemoryLoanState>,
        store: Arc<MemoryFactStore>,
        audit: Arc<MemoryAuditSink>,
        service: FactService,
    }

    fn setup() -> Fixture {
        let state = Arc::new(MemoryLoanState::new());
        let store = Arc::new(MemoryFactStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let service = FactService::new(
            state.clone(),
            store.clone(),
            Auditor::new(audit.clone()),
            FactVersions::default(),
        );
        Fixture {
            state,
            store,
            audit,
            service,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("t1").unwrap().with_correlation("corr-1")
    }

    fn seed_loan(state: &MemoryLoanState, done: bool) {
        let mut loan = LoanRecord::new("L1", "Alpha");
        loan.checklist = vec![ChecklistItem {
            id: "i1".into(),
            title: "Facility agreement".into(),
            category: ChecklistCategory::Documents,
            status: if done { ChecklistStatus::Done } else { ChecklistStatus::Open },
            weight: 20,
        }];
        state.upsert_loan("t1", loan).unwrap();
    }

    #[tokio::test]
    async fn test_missing_loan_fails() {
        let f = setup();
        let err = f.service.compute_readiness(&ctx(), "nope").await.unwrap_err();
        assert!(matches!(err, FactError::LoanNotFound(_)));
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_missing_covenant_fails() {
        let f = setup();
        seed_loan(&f.state, false);
        let err = f.service.compute_covenant(&ctx(), "L1", "C404").await.unwrap_err();
        assert!(matches!(err, FactError::CovenantNotFound { .. }));
    }

    #[tokio::test]
    async fn test_recompute_unchanged_dedups() {
        let f = setup();
        seed_loan(&f.state, false);

        let first = f.service.compute_readiness(&ctx(), "L1").await.unwrap();
        let second = f.service.compute_readiness(&ctx(), "L1").await.unwrap();

        assert!(!first.drifted);
        assert!(!second.drifted);
        assert_eq!(first.snapshot.id, second.snapshot.id);
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.audit.count(AuditEventType::FactComputed), 2);
        assert_eq!(f.audit.count(AuditEventType::FactDriftDetected), 0);

        let computed = f.audit.of_type(AuditEventType::FactComputed);
        assert_eq!(computed[1].payload["deduplicated"], true);
        assert_eq!(computed[0].correlation_id.as_deref(), Some("corr-1"));
    }

    #[tokio::test]
    async fn test_state_change_drifts() {
        let f = setup();
        seed_loan(&f.state, false);
        let first = f.service.compute_readiness(&ctx(), "L1").await.unwrap();

        seed_loan(&f.state, true);
        let second = f.service.compute_readiness(&ctx(), "L1").await.unwrap();

        assert!(second.drifted);
        assert_eq!(second.prev_fact_hash.as_deref(), Some(first.snapshot.fact_hash.as_str()));
        let drift = f.audit.of_type(AuditEventType::FactDriftDetected);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].payload["prevFactHash"], first.snapshot.fact_hash.as_str());
        assert_eq!(drift[0].payload["nextFactHash"], second.snapshot.fact_hash.as_str());
        assert_eq!(drift[0].payload["module"], "TRADING");

        let latest = f.service.latest(&ctx(), &EntityRef::loan("L1")).await.unwrap().unwrap();
        assert_eq!(latest.fact_hash, second.snapshot.fact_hash);
        assert_eq!(f.service.history(&ctx(), &EntityRef::loan("L1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_revert_to_earlier_hash_keeps_drifting() {
        let f = setup();
        let entity = EntityRef::loan("L1");
        seed_loan(&f.state, false);
        let a = f.service.compute_readiness(&ctx(), "L1").await.unwrap();

        seed_loan(&f.state, true);
        let b = f.service.compute_readiness(&ctx(), "L1").await.unwrap();
        assert!(b.drifted);

        // Back to A: upsert returns the original A row, latest stays B
        seed_loan(&f.state, false);
        let reverted = f.service.compute_readiness(&ctx(), "L1").await.unwrap();
        assert!(reverted.drifted);
        assert_eq!(reverted.snapshot.id, a.snapshot.id);
        assert_eq!(reverted.prev_fact_hash.as_deref(), Some(b.snapshot.fact_hash.as_str()));
        let latest = f.service.latest(&ctx(), &entity).await.unwrap().unwrap();
        assert_eq!(latest.fact_hash, b.snapshot.fact_hash);

        // Every unchanged recompute after the revert drifts again
        let again = f.service.compute_readiness(&ctx(), "L1").await.unwrap();
        assert!(again.drifted);
        assert_eq!(f.store.len(), 2);
        assert_eq!(f.audit.count(AuditEventType::FactDriftDetected), 3);
    }

    #[tokio::test]
    async fn test_version_bump_changes_hash() {
        let f = setup();
        seed_loan(&f.state, false);
        let v1 = f.service.compute_readiness(&ctx(), "L1").await.unwrap();

        let bumped = FactService::new(
            f.state.clone(),
            f.store.clone(),
            Auditor::new(f.audit.clone()),
            FactVersions {
                readiness: 2,
                ..FactVersions::default()
            },
        );
        let v2 = bumped.compute_readiness(&ctx(), "L1").await.unwrap();
        assert_ne!(v1.snapshot.fact_hash, v2.snapshot.fact_hash);
        assert!(v2.drifted);
        assert_eq!(v2.snapshot.fact_version, 2);
    }

    #[tokio::test]
    async fn test_portfolio_over_empty_tenant() {
        let f = setup();
        let outcome = f.service.compute_portfolio(&ctx(), "t1").await.unwrap();
        assert_eq!(outcome.snapshot.facts["loanCount"], 0);
        assert_eq!(outcome.snapshot.domain, FactDomain::Portfolio);
    }
}
