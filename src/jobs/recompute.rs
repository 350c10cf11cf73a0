//! # Recompute
//!
//! Fact recompute with its follow-up: a drifted snapshot gets an
//! explanation-recompute job, an unchanged one does not. A manual request
//! always enqueues.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::errors::JobResult;
use super::payload::ExplainRecomputeJob;
use super::producer::JobProducer;
use crate::context::RequestContext;
use crate::explain::{audience, derive_audience, ExplainError};
use crate::facts::{ComputeOutcome, EntityRef, FactService};
use crate::gateway::Verbosity;
use crate::observability::{AuditEvent, AuditEventType, Auditor};

/// Audience of explain jobs enqueued on drift.
pub const DRIFT_AUDIENCE: &str = audience::TRADING_ANALYST;

/// Verbosity of explain jobs enqueued on drift.
pub const DRIFT_VERBOSITY: Verbosity = Verbosity::Standard;

const RECOMPUTE_CLIENT: &str = "explain-recompute";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeOutcome {
    #[serde(flatten)]
    pub outcome: ComputeOutcome,
    /// Explain job enqueued because the facts drifted
    pub explain_job_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct Recomputer {
    facts: Arc<FactService>,
    producer: JobProducer,
    auditor: Auditor,
}

impl Recomputer {
    pub fn new(facts: Arc<FactService>, producer: JobProducer, auditor: Auditor) -> Self {
        Self {
            facts,
            producer,
            auditor,
        }
    }

    pub fn facts(&self) -> &Arc<FactService> {
        &self.facts
    }

    /// Recompute facts; enqueue an explanation job only on drift
    pub async fn recompute(&self, ctx: &RequestContext, entity: &EntityRef) -> JobResult<RecomputeOutcome> {
        let outcome = self.facts.compute(ctx, entity).await?;

        let explain_job_id = if outcome.drifted {
            let job = ExplainRecomputeJob::new(
                ctx,
                entity.clone(),
                outcome.snapshot.fact_hash.clone(),
                DRIFT_AUDIENCE,
                DRIFT_VERBOSITY,
            );
            Some(self.producer.enqueue_explain_recompute(ctx, job).await?)
        } else {
            None
        };

        Ok(RecomputeOutcome {
            outcome,
            explain_job_id,
        })
    }

    /// User-forced explanation recompute against the latest snapshot,
    /// regardless of drift
    pub async fn request_explain_recompute(
        &self,
        ctx: &RequestContext,
        entity: &EntityRef,
        audience: Option<String>,
        verbosity: Verbosity,
    ) -> JobResult<Uuid> {
        let snapshot = self
            .facts
            .latest(ctx, entity)
            .await?
            .ok_or_else(|| ExplainError::PrerequisiteMissing {
                entity: entity.to_string(),
                fact_hash: None,
            })?;
        let audience = audience.unwrap_or_else(|| derive_audience(ctx.roles()).to_string());

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                RECOMPUTE_CLIENT,
                AuditEventType::AiExplainRecomputeRequested,
                format!("{} explanation recompute requested", entity.domain().as_str()),
            )
            .with_evidence(entity.evidence_ref())
            .with_payload(json!({
                "entity": entity,
                "factHash": snapshot.fact_hash,
                "audience": audience,
                "verbosity": verbosity.as_str(),
            })),
        )?;

        let job = ExplainRecomputeJob::new(ctx, entity.clone(), snapshot.fact_hash, audience, verbosity);
        self.producer.enqueue_explain_recompute(ctx, job).await
    }
}
