//! # Explainability Service
//!
//! Cache in front of the gateway. A hit is audited and returned without a
//! generation call; a miss is audited, generated, stored unique-by-hash and
//! audited again with the backend that served it. Nothing is invalidated:
//! staleness is a read-time comparison against the latest fact hash.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::audience::derive_audience;
use super::errors::{ExplainError, ExplainResult};
use super::record::{ExplanationKey, ExplanationRecord, ExplanationStore, EXPLAIN_VERSION, GENERATION_VARIANT};
use crate::context::RequestContext;
use crate::facts::{EntityRef, FactDomain, FactService, FactSnapshot};
use crate::gateway::{
    CallTarget, ExplainabilityGateway, GenerateRequest, LlmPolicy, OutputSchema, SafetyFlags, TemplateId,
    TemplateVars, Verbosity,
};
use crate::observability::{AuditEvent, AuditEventType, Auditor};

/// Client id on explanation audit events.
pub const EXPLAIN_CLIENT: &str = "explainability-service";

/// What to explain and for whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainRequest {
    pub entity: EntityRef,
    /// Snapshot to explain; the entity's latest when unset
    pub fact_hash: Option<String>,
    /// Derived from the caller's roles when unset
    pub audience: Option<String>,
    pub verbosity: Verbosity,
    pub explain_version: u32,
}

impl ExplainRequest {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            fact_hash: None,
            audience: None,
            verbosity: Verbosity::default(),
            explain_version: EXPLAIN_VERSION,
        }
    }

    pub fn with_fact_hash(mut self, fact_hash: impl Into<String>) -> Self {
        self.fact_hash = Some(fact_hash.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainResponse {
    /// Served from the cache without a generation call
    pub cached: bool,
    pub record: ExplanationRecord,
}

/// Latest cached explanation with its read-time staleness
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestExplanation {
    pub exists: bool,
    pub is_stale: bool,
    pub latest_fact_hash: Option<String>,
    pub explanation: Option<ExplanationRecord>,
}

/// Template, schema and safety settings per fact domain
fn template_for(domain: FactDomain) -> (TemplateId, OutputSchema, Option<SafetyFlags>) {
    match domain {
        FactDomain::Readiness => (TemplateId::ExplainTradingReadiness, OutputSchema::Standard, None),
        FactDomain::Covenant => (
            TemplateId::ExplainCovenant,
            OutputSchema::Covenant,
            Some(SafetyFlags::strict()),
        ),
        FactDomain::EsgKpi => (TemplateId::ExplainEsgKpi, OutputSchema::Standard, None),
        FactDomain::Portfolio => (TemplateId::ExplainPortfolioRisk, OutputSchema::Standard, None),
    }
}

pub struct ExplainabilityService {
    facts: Arc<FactService>,
    gateway: Arc<ExplainabilityGateway>,
    store: Arc<dyn ExplanationStore>,
    auditor: Auditor,
}

impl ExplainabilityService {
    pub fn new(
        facts: Arc<FactService>,
        gateway: Arc<ExplainabilityGateway>,
        store: Arc<dyn ExplanationStore>,
        auditor: Auditor,
    ) -> Self {
        Self {
            facts,
            gateway,
            store,
            auditor,
        }
    }

    /// Explain a fact snapshot, from cache when possible
    pub async fn explain(&self, ctx: &RequestContext, req: ExplainRequest) -> ExplainResult<ExplainResponse> {
        req.entity.validate()?;
        if req.explain_version == 0 {
            return Err(ExplainError::Validation("explain version must be positive".into()));
        }

        let audience = match &req.audience {
            Some(a) if a.trim().is_empty() => {
                return Err(ExplainError::Validation("audience must not be empty".into()))
            }
            Some(a) => a.clone(),
            None => derive_audience(ctx.roles()).to_string(),
        };

        let snapshot = self.snapshot_for(ctx, &req.entity, req.fact_hash.as_deref()).await?;

        let explanation_hash = ExplanationKey {
            tenant_id: ctx.tenant_id(),
            entity: &req.entity,
            fact_hash: &snapshot.fact_hash,
            audience: &audience,
            verbosity: req.verbosity,
            explain_version: req.explain_version,
        }
        .hash();

        let base_payload = json!({
            "entity": req.entity,
            "factHash": snapshot.fact_hash,
            "audience": audience,
            "verbosity": req.verbosity.as_str(),
            "explainVersion": req.explain_version,
            "provider": GENERATION_VARIANT,
            "explanationHash": explanation_hash,
        });

        if let Some(record) = self.store.find(ctx.tenant_id(), &explanation_hash).await? {
            self.auditor.record(
                AuditEvent::for_request(
                    ctx,
                    EXPLAIN_CLIENT,
                    AuditEventType::ExplainCacheHit,
                    format!("{} explanation served from cache", req.entity.domain().as_str()),
                )
                .with_evidence(req.entity.evidence_ref())
                .with_payload(base_payload),
            )?;
            tracing::debug!(entity = %req.entity, hash = %explanation_hash, "explanation cache hit");
            return Ok(ExplainResponse { cached: true, record });
        }

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                EXPLAIN_CLIENT,
                AuditEventType::ExplainRequested,
                format!("{} explanation requested", req.entity.domain().as_str()),
            )
            .with_evidence(req.entity.evidence_ref())
            .with_payload(base_payload.clone()),
        )?;

        let domain = req.entity.domain();
        let (template_id, output_schema, safety) = template_for(domain);
        let generated = self
            .gateway
            .generate(
                ctx,
                GenerateRequest {
                    template_id,
                    template_version: 1,
                    vars: TemplateVars {
                        facts: snapshot.facts.clone(),
                        audience: audience.clone(),
                        verbosity: req.verbosity.as_str().to_string(),
                        safety,
                    },
                    output_schema,
                    policy: LlmPolicy::new(domain.module(), audience.clone(), req.verbosity),
                    target: CallTarget {
                        entity_type: req.entity.entity_type().to_string(),
                        entity_id: req.entity.evidence_ref().to_string(),
                        fact_hash: Some(snapshot.fact_hash.clone()),
                    },
                },
            )
            .await?;

        let record = self
            .store
            .insert_if_absent(ExplanationRecord {
                id: Uuid::new_v4(),
                tenant_id: ctx.tenant_id().to_string(),
                entity: req.entity.clone(),
                explanation_hash: explanation_hash.clone(),
                fact_hash: snapshot.fact_hash.clone(),
                audience,
                verbosity: req.verbosity,
                explain_version: req.explain_version,
                backend: generated.backend.clone(),
                model: generated.model.clone(),
                result: generated.output,
                created_at: Utc::now(),
                correlation_id: ctx.correlation_id().map(str::to_string),
            })
            .await?;

        let mut payload = base_payload;
        payload["backend"] = json!(generated.backend);
        payload["model"] = json!(generated.model);
        payload["confidence"] = json!(record.result.confidence);

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                EXPLAIN_CLIENT,
                AuditEventType::ExplainGenerated,
                format!("{} explanation generated", domain.as_str()),
            )
            .with_evidence(req.entity.evidence_ref())
            .with_payload(payload),
        )?;

        tracing::info!(
            entity = %req.entity,
            backend = %generated.backend,
            hash = %explanation_hash,
            "explanation generated"
        );

        Ok(ExplainResponse { cached: false, record })
    }

    /// Latest cached explanation and whether the facts moved on since
    pub async fn latest_explanation(
        &self,
        ctx: &RequestContext,
        entity: &EntityRef,
        audience: &str,
        verbosity: Verbosity,
    ) -> ExplainResult<LatestExplanation> {
        entity.validate()?;
        let latest_fact_hash = self.facts.latest(ctx, entity).await?.map(|s| s.fact_hash);
        let explanation = self
            .store
            .latest_for(ctx.tenant_id(), entity, audience, verbosity)
            .await?;

        let is_stale = match (&explanation, &latest_fact_hash) {
            (Some(record), Some(latest)) => &record.fact_hash != latest,
            _ => false,
        };

        Ok(LatestExplanation {
            exists: explanation.is_some(),
            is_stale,
            latest_fact_hash,
            explanation,
        })
    }

    async fn snapshot_for(
        &self,
        ctx: &RequestContext,
        entity: &EntityRef,
        fact_hash: Option<&str>,
    ) -> ExplainResult<FactSnapshot> {
        let snapshot = match fact_hash {
            Some(hash) => self
                .facts
                .find_by_hash(ctx, entity.domain(), hash)
                .await?
                .filter(|s| &s.entity == entity),
            None => self.facts.latest(ctx, entity).await?,
        };

        snapshot.ok_or_else(|| ExplainError::PrerequisiteMissing {
            entity: entity.to_string(),
            fact_hash: fact_hash.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FactVersions, RateLimitConfig, RedactionConfig};
    use crate::explain::MemoryExplanationStore;
    use crate::facts::MemoryFactStore;
    use crate::gateway::{BackendSlot, DemoBackend, MemoryRateCounter, ProviderRouter, RateLimiter, Redactor};
    use crate::observability::MemoryAuditSink;
    use crate::state::{CovenantRecord, LoanRecord, MemoryLoanState, Observation, ThresholdOperator};
    use std::time::Duration;

    struct Fixture {
        state: Arc<MemoryLoanState>,
        facts: Arc<FactService>,
        audit: Arc<MemoryAuditSink>,
        primary: Arc<DemoBackend>,
        service: ExplainabilityService,
    }

    fn setup() -> Fixture {
        let audit = Arc::new(MemoryAuditSink::new());
        let auditor = Auditor::new(audit.clone());
        let state = Arc::new(MemoryLoanState::new());

        let mut loan = LoanRecord::new("L1", "Term Loan A");
        loan.covenants.push(CovenantRecord {
            id: "C1".into(),
            name: "DSCR".into(),
            covenant_type: "FINANCIAL".into(),
            metric: "DSCR".into(),
            operator: ThresholdOperator::Gte,
            threshold: 1.25,
            formula: None,
            observed: Some(Observation {
                value: 1.1,
                as_of: "2026-06-30".into(),
                inputs: Default::default(),
            }),
            source_doc_ids: vec![],
        });
        state.upsert_loan("t1", loan).unwrap();

        let facts = Arc::new(FactService::new(
            state.clone(),
            Arc::new(MemoryFactStore::new()),
            auditor.clone(),
            FactVersions::default(),
        ));
        let primary = Arc::new(DemoBackend::new("DEMO_PRIMARY"));
        let gateway = Arc::new(ExplainabilityGateway::new(
            Redactor::from_config(&RedactionConfig::default()).unwrap(),
            RateLimiter::new(
                Arc::new(MemoryRateCounter::new()),
                RateLimitConfig::default(),
                auditor.clone(),
            ),
            ProviderRouter::new(
                BackendSlot::new("DEMO_PRIMARY", primary.clone()),
                BackendSlot::new("DEMO_FALLBACK", Arc::new(DemoBackend::new("DEMO_FALLBACK"))),
            ),
            auditor.clone(),
            Duration::from_secs(5),
        ));
        let service = ExplainabilityService::new(
            facts.clone(),
            gateway,
            Arc::new(MemoryExplanationStore::new()),
            auditor,
        );
        Fixture {
            state,
            facts,
            audit,
            primary,
            service,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("t1").unwrap()
    }

    #[tokio::test]
    async fn test_requires_snapshot() {
        let f = setup();
        let err = f
            .service
            .explain(&ctx(), ExplainRequest::new(EntityRef::loan("L1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::PrerequisiteMissing { .. }));
        assert_eq!(f.primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_request_hits_cache() {
        let f = setup();
        let ctx = ctx();
        f.facts.compute_readiness(&ctx, "L1").await.unwrap();

        let req = ExplainRequest::new(EntityRef::loan("L1")).with_audience("ANALYST");
        let first = f.service.explain(&ctx, req.clone()).await.unwrap();
        let second = f.service.explain(&ctx, req).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(f.primary.calls(), 1);
        assert_eq!(f.audit.count(AuditEventType::ExplainRequested), 1);
        assert_eq!(f.audit.count(AuditEventType::ExplainGenerated), 1);
        assert_eq!(f.audit.count(AuditEventType::ExplainCacheHit), 1);
    }

    #[tokio::test]
    async fn test_audience_from_roles() {
        let f = setup();
        let ctx = ctx()
            .with_actor("u1")
            .with_roles(vec!["COMPLIANCE_AUDITOR".into()]);
        f.facts.compute_readiness(&ctx, "L1").await.unwrap();

        let res = f
            .service
            .explain(&ctx, ExplainRequest::new(EntityRef::loan("L1")))
            .await
            .unwrap();
        assert_eq!(res.record.audience, "COMPLIANCE");
    }

    #[tokio::test]
    async fn test_covenant_uses_covenant_template() {
        let f = setup();
        let ctx = ctx();
        f.facts.compute_covenant(&ctx, "L1", "C1").await.unwrap();

        f.service
            .explain(&ctx, ExplainRequest::new(EntityRef::covenant("L1", "C1")))
            .await
            .unwrap();

        let requested = f.audit.of_type(AuditEventType::AiCallRequested);
        assert_eq!(requested[0].payload["templateId"], "EXPLAIN_COVENANT");
        assert_eq!(requested[0].payload["module"], "SERVICING");
        assert_eq!(requested[0].payload["model"], "explain-covenant-v1");
    }

    #[tokio::test]
    async fn test_staleness_is_read_time() {
        let f = setup();
        let ctx = ctx();
        let entity = EntityRef::loan("L1");

        let before = f.facts.compute_readiness(&ctx, "L1").await.unwrap();
        let h1 = before.snapshot.fact_hash.clone();
        f.service
            .explain(&ctx, ExplainRequest::new(entity.clone()).with_audience("ANALYST"))
            .await
            .unwrap();

        let fresh = f
            .service
            .latest_explanation(&ctx, &entity, "ANALYST", Verbosity::Standard)
            .await
            .unwrap();
        assert!(fresh.exists);
        assert!(!fresh.is_stale);

        f.state
            .update_loan("t1", "L1", |loan| loan.has_servicing_scenarios = true)
            .unwrap();
        let after = f.facts.compute_readiness(&ctx, "L1").await.unwrap();
        assert!(after.drifted);

        let stale = f
            .service
            .latest_explanation(&ctx, &entity, "ANALYST", Verbosity::Standard)
            .await
            .unwrap();
        assert!(stale.is_stale);
        assert_eq!(stale.latest_fact_hash.as_deref(), Some(after.snapshot.fact_hash.as_str()));
        assert_eq!(stale.explanation.unwrap().fact_hash, h1);

        // The old explanation is still served for its own hash
        let old = f
            .service
            .explain(
                &ctx,
                ExplainRequest::new(entity.clone())
                    .with_audience("ANALYST")
                    .with_fact_hash(h1),
            )
            .await
            .unwrap();
        assert!(old.cached);
    }

    #[tokio::test]
    async fn test_missing_explanation_sentinel() {
        let f = setup();
        let latest = f
            .service
            .latest_explanation(&ctx(), &EntityRef::loan("L1"), "ANALYST", Verbosity::Short)
            .await
            .unwrap();
        assert!(!latest.exists);
        assert!(!latest.is_stale);
        assert!(latest.explanation.is_none());
    }
}
