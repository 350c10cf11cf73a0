//! Explanation Cache Integration Tests
//!
//! Tests for the content-addressed explanation cache:
//! - identical requests generate once and are then served from cache
//! - staleness is derived at read time, cached rows never change
//! - a fact version bump changes the cache key
//! - a missing snapshot is a prerequisite error, not a generation call

use std::sync::Arc;

use factline::config::FactlineConfig;
use factline::context::RequestContext;
use factline::explain::{ExplainError, ExplainRequest};
use factline::facts::EntityRef;
use factline::gateway::Verbosity;
use factline::observability::{AuditEventType, MemoryAuditSink};
use factline::state::LoanRecord;
use factline::{FactlineError, Pipeline};

// =============================================================================
// Test Utilities
// =============================================================================

fn setup_with(config: &FactlineConfig) -> (Pipeline, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let pipeline = Pipeline::with_sink(config, audit.clone()).unwrap();
    pipeline
        .state
        .upsert_loan("t1", LoanRecord::new("L1", "Term Loan A"))
        .unwrap();
    (pipeline, audit)
}

fn setup() -> (Pipeline, Arc<MemoryAuditSink>) {
    setup_with(&FactlineConfig::default())
}

fn ctx() -> RequestContext {
    RequestContext::new("t1").unwrap().with_actor("analyst-1")
}

fn analyst_request() -> ExplainRequest {
    ExplainRequest::new(EntityRef::loan("L1"))
        .with_audience("ANALYST")
        .with_verbosity(Verbosity::Standard)
}

// =============================================================================
// Cache Correctness
// =============================================================================

#[tokio::test]
async fn test_identical_requests_generate_once() {
    let (pipeline, audit) = setup();
    let ctx = ctx();
    let out = pipeline.facts.compute_readiness(&ctx, "L1").await.unwrap();
    let h = out.snapshot.fact_hash;

    let req = analyst_request().with_fact_hash(h.clone());
    let first = pipeline.explain.explain(&ctx, req.clone()).await.unwrap();
    let second = pipeline.explain.explain(&ctx, req).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.record, second.record);
    assert_eq!(first.record.fact_hash, h);
    assert_eq!(first.record.backend, "DEMO_PRIMARY");

    // One miss pair, one hit, one backend call
    assert_eq!(audit.count(AuditEventType::ExplainRequested), 1);
    assert_eq!(audit.count(AuditEventType::ExplainGenerated), 1);
    assert_eq!(audit.count(AuditEventType::ExplainCacheHit), 1);
    assert_eq!(audit.count(AuditEventType::AiCallRequested), 1);
    assert_eq!(audit.count(AuditEventType::AiCallCompleted), 1);

    let generated = audit.of_type(AuditEventType::ExplainGenerated);
    assert_eq!(generated[0].payload["backend"], "DEMO_PRIMARY");
    assert_eq!(generated[0].evidence_ref.as_deref(), Some("L1"));
}

#[tokio::test]
async fn test_cache_key_covers_audience_and_verbosity() {
    let (pipeline, _) = setup();
    let ctx = ctx();
    pipeline.facts.compute_readiness(&ctx, "L1").await.unwrap();

    let standard = pipeline.explain.explain(&ctx, analyst_request()).await.unwrap();
    let detailed = pipeline
        .explain
        .explain(&ctx, analyst_request().with_verbosity(Verbosity::Detailed))
        .await
        .unwrap();
    let viewer = pipeline
        .explain
        .explain(&ctx, analyst_request().with_audience("VIEWER"))
        .await
        .unwrap();

    assert!(!detailed.cached);
    assert!(!viewer.cached);
    assert_ne!(standard.record.explanation_hash, detailed.record.explanation_hash);
    assert_ne!(standard.record.explanation_hash, viewer.record.explanation_hash);
    assert_eq!(detailed.record.model, "explain-trading-detailed-v1");
    assert_eq!(standard.record.model, "explain-trading-v1");
}

#[tokio::test]
async fn test_fact_version_bump_changes_key() {
    let (old, _) = setup();
    let mut bumped_config = FactlineConfig::default();
    bumped_config.fact_versions.readiness = 2;
    let (bumped, _) = setup_with(&bumped_config);
    let ctx = ctx();

    let a = old.facts.compute_readiness(&ctx, "L1").await.unwrap();
    let b = bumped.facts.compute_readiness(&ctx, "L1").await.unwrap();
    assert_ne!(a.snapshot.fact_hash, b.snapshot.fact_hash);
    assert_eq!(b.snapshot.fact_version, 2);

    let ea = old.explain.explain(&ctx, analyst_request()).await.unwrap();
    let eb = bumped.explain.explain(&ctx, analyst_request()).await.unwrap();
    assert_ne!(ea.record.explanation_hash, eb.record.explanation_hash);
}

#[tokio::test]
async fn test_explain_without_snapshot() {
    let (pipeline, audit) = setup();

    let err = pipeline.explain.explain(&ctx(), analyst_request()).await.unwrap_err();
    assert!(matches!(err, ExplainError::PrerequisiteMissing { .. }));
    let err = FactlineError::from(err);
    assert_eq!(err.status_code(), 409);
    assert_eq!(audit.count(AuditEventType::AiCallRequested), 0);
}

#[tokio::test]
async fn test_unknown_fact_hash_is_prerequisite_missing() {
    let (pipeline, _) = setup();
    let ctx = ctx();
    pipeline.facts.compute_readiness(&ctx, "L1").await.unwrap();

    let err = pipeline
        .explain
        .explain(&ctx, analyst_request().with_fact_hash("0".repeat(64)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExplainError::PrerequisiteMissing { fact_hash: Some(_), .. }));
}

// =============================================================================
// Read-Time Staleness
// =============================================================================

#[tokio::test]
async fn test_staleness_until_regenerated() {
    let (pipeline, _) = setup();
    let ctx = ctx();
    let entity = EntityRef::loan("L1");

    let none = pipeline
        .explain
        .latest_explanation(&ctx, &entity, "ANALYST", Verbosity::Standard)
        .await
        .unwrap();
    assert!(!none.exists);
    assert!(!none.is_stale);
    assert!(none.explanation.is_none());

    let h1 = pipeline.facts.compute_readiness(&ctx, "L1").await.unwrap().snapshot.fact_hash;
    let cached = pipeline.explain.explain(&ctx, analyst_request()).await.unwrap().record;

    pipeline
        .state
        .update_loan("t1", "L1", |loan| loan.has_servicing_scenarios = true)
        .unwrap();
    let h2 = pipeline.facts.compute_readiness(&ctx, "L1").await.unwrap().snapshot.fact_hash;
    assert_ne!(h1, h2);

    let stale = pipeline
        .explain
        .latest_explanation(&ctx, &entity, "ANALYST", Verbosity::Standard)
        .await
        .unwrap();
    assert!(stale.exists);
    assert!(stale.is_stale);
    assert_eq!(stale.latest_fact_hash.as_deref(), Some(h2.as_str()));
    assert_eq!(stale.explanation.as_ref(), Some(&cached));

    // The h1 explanation is still addressable unchanged
    let old = pipeline
        .explain
        .explain(&ctx, analyst_request().with_fact_hash(h1.clone()))
        .await
        .unwrap();
    assert!(old.cached);
    assert_eq!(old.record, cached);

    let fresh = pipeline.explain.explain(&ctx, analyst_request()).await.unwrap();
    assert!(!fresh.cached);
    assert_eq!(fresh.record.fact_hash, h2);

    let latest = pipeline
        .explain
        .latest_explanation(&ctx, &entity, "ANALYST", Verbosity::Standard)
        .await
        .unwrap();
    assert!(!latest.is_stale);
    assert_eq!(latest.explanation.unwrap().fact_hash, h2);
}
