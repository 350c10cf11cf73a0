//! # Explainability Gateway
//!
//! Single entry point for generation calls. Stages run strictly in order:
//!
//! 1. render the versioned template
//! 2. redact, then checksum the redacted text
//! 3. rate-limit (a denial stops here, before any request event)
//! 4. route to primary and fallback
//! 5. audit AI_CALL_REQUESTED against the primary
//! 6. call the primary under a timeout and validate its output
//! 7. on a transient failure only, one attempt against the fallback
//!
//! Every call that passes the limiter emits exactly one requested event and
//! exactly one terminal event (completed or failed).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use super::backend::{BackendResponse, Usage};
use super::cost::estimate_cost_usd;
use super::errors::{GatewayError, GatewayResult, GenerationError};
use super::policy::LlmPolicy;
use super::prompts::{self, TemplateId, TemplateVars};
use super::ratelimit::RateLimiter;
use super::redaction::{self, Redactor};
use super::router::{ProviderRouter, RouteTarget};
use super::schema::{ExplainOutput, OutputSchema};
use crate::context::RequestContext;
use crate::observability::{AuditEvent, AuditEventType, Auditor};

/// Client id on gateway audit events.
pub const GATEWAY_CLIENT: &str = "ai-gateway-service";

/// Entity a call is made about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTarget {
    pub entity_type: String,
    pub entity_id: String,
    pub fact_hash: Option<String>,
}

impl CallTarget {
    pub fn evidence_ref(&self) -> String {
        format!("{}:{}", self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub template_id: TemplateId,
    pub template_version: u32,
    pub vars: TemplateVars,
    pub output_schema: OutputSchema,
    pub policy: LlmPolicy,
    pub target: CallTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResult {
    pub output: ExplainOutput,
    /// Backend that actually served the call
    pub backend: String,
    pub model: String,
    pub prompt_checksum: String,
    pub duration_ms: u64,
    pub usage: Option<Usage>,
    pub cost_usd: Option<f64>,
    pub redaction_applied: bool,
    pub redaction_categories: Vec<String>,
}

/// Values shared by every event of one call
struct CallInfo<'a> {
    req: &'a GenerateRequest,
    checksum: &'a str,
    redaction_applied: bool,
    redaction_categories: &'a [String],
}

impl CallInfo<'_> {
    fn payload(&self, backend: &str, model: &str) -> Value {
        let req = self.req;
        json!({
            "purpose": LlmPolicy::PURPOSE,
            "module": req.policy.module.as_str(),
            "audience": req.policy.audience,
            "verbosity": req.policy.verbosity.as_str(),
            "templateId": req.template_id.as_str(),
            "templateVersion": req.template_version,
            "outputSchema": req.output_schema,
            "backend": backend,
            "model": model,
            "promptChecksum": self.checksum,
            "redactionApplied": self.redaction_applied,
            "redactionCategories": self.redaction_categories,
            "entityType": req.target.entity_type,
            "entityId": req.target.entity_id,
            "factHash": req.target.fact_hash,
            "durationMs": Value::Null,
            "usage": Value::Null,
            "costUsd": Value::Null,
        })
    }
}

pub struct ExplainabilityGateway {
    redactor: Redactor,
    limiter: RateLimiter,
    router: ProviderRouter,
    auditor: Auditor,
    timeout: Duration,
}

impl ExplainabilityGateway {
    pub fn new(
        redactor: Redactor,
        limiter: RateLimiter,
        router: ProviderRouter,
        auditor: Auditor,
        timeout: Duration,
    ) -> Self {
        Self {
            redactor,
            limiter,
            router,
            auditor,
            timeout,
        }
    }

    #[instrument(
        skip_all,
        fields(
            tenant_id = ctx.tenant_id(),
            template = %req.template_id,
            module = %req.policy.module,
            entity = %req.target.evidence_ref(),
        )
    )]
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        req: GenerateRequest,
    ) -> GatewayResult<GenerateResult> {
        let prompt = prompts::render_prompt(req.template_id, req.template_version, &req.vars)?;
        let redacted = self.redactor.redact(&prompt);
        let checksum = redaction::checksum(&redacted.redacted_text);
        let evidence_ref = req.target.evidence_ref();

        self.limiter
            .enforce(ctx, req.policy.module, req.template_id, &evidence_ref)
            .await?;

        let route = self.router.route(&req.policy);
        let info = CallInfo {
            req: &req,
            checksum: &checksum,
            redaction_applied: redacted.applied,
            redaction_categories: &redacted.categories,
        };

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                GATEWAY_CLIENT,
                AuditEventType::AiCallRequested,
                format!("AI call requested via {} ({})", route.primary.name, req.template_id),
            )
            .with_evidence(&evidence_ref)
            .with_payload(info.payload(&route.primary.name, &route.primary.model)),
        )?;

        let started = Instant::now();

        let primary_err = match self.attempt(&route.primary, &redacted.redacted_text, req.output_schema).await {
            Ok((output, response)) => {
                return self.complete(ctx, &info, &route.primary, output, response, started);
            }
            Err(err) => err,
        };

        if !primary_err.is_transient() {
            self.fail(ctx, &info, &route.primary, &primary_err, started);
            return Err(primary_err);
        }

        tracing::warn!(
            backend = %route.primary.name,
            fallback = %route.fallback.name,
            error = %primary_err,
            "primary failed with a transient error, trying fallback"
        );

        match self.attempt(&route.fallback, &redacted.redacted_text, req.output_schema).await {
            Ok((output, response)) => {
                self.complete(ctx, &info, &route.fallback, output, response, started)
            }
            Err(err) => {
                self.fail(ctx, &info, &route.fallback, &err, started);
                Err(err)
            }
        }
    }

    /// One backend call, bounded by the timeout, then schema validation.
    async fn attempt(
        &self,
        target: &RouteTarget,
        prompt: &str,
        schema: OutputSchema,
    ) -> GatewayResult<(ExplainOutput, BackendResponse)> {
        let call = target.backend.generate(prompt, &target.model);
        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(GatewayError::Generation {
                    backend: target.name.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(GatewayError::Generation {
                    backend: target.name.clone(),
                    source: GenerationError::transient(format!(
                        "timed out after {}ms",
                        self.timeout.as_millis()
                    )),
                })
            }
        };

        let output = schema.validate(&response.json)?;
        Ok((output, response))
    }

    fn complete(
        &self,
        ctx: &RequestContext,
        info: &CallInfo<'_>,
        target: &RouteTarget,
        output: ExplainOutput,
        response: BackendResponse,
        started: Instant,
    ) -> GatewayResult<GenerateResult> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let cost_usd = estimate_cost_usd(&response.model, response.usage.as_ref());

        let mut payload = info.payload(&target.name, &response.model);
        payload["durationMs"] = json!(duration_ms);
        payload["usage"] = json!(response.usage);
        payload["costUsd"] = json!(cost_usd);

        self.auditor.record(
            AuditEvent::for_request(
                ctx,
                GATEWAY_CLIENT,
                AuditEventType::AiCallCompleted,
                format!("AI call completed via {} ({})", target.name, info.req.template_id),
            )
            .with_evidence(info.req.target.evidence_ref())
            .with_payload(payload),
        )?;

        tracing::info!(backend = %target.name, model = %response.model, duration_ms, "AI call completed");

        Ok(GenerateResult {
            output,
            backend: target.name.clone(),
            model: response.model,
            prompt_checksum: info.checksum.to_string(),
            duration_ms,
            usage: response.usage,
            cost_usd,
            redaction_applied: info.redaction_applied,
            redaction_categories: info.redaction_categories.to_vec(),
        })
    }

    fn fail(
        &self,
        ctx: &RequestContext,
        info: &CallInfo<'_>,
        target: &RouteTarget,
        err: &GatewayError,
        started: Instant,
    ) {
        let mut payload = info.payload(&target.name, &target.model);
        payload["durationMs"] = json!(started.elapsed().as_millis() as u64);
        payload["errorType"] = json!(err.error_type());
        payload["errorMessage"] = json!(err.to_string());

        self.auditor.record_on_failure(
            AuditEvent::for_request(
                ctx,
                GATEWAY_CLIENT,
                AuditEventType::AiCallFailed,
                format!("AI call failed via {} ({})", target.name, info.req.template_id),
            )
            .with_evidence(info.req.target.evidence_ref())
            .with_payload(payload),
        );

        tracing::error!(backend = %target.name, error = %err, "AI call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, RedactionConfig, WindowLimit};
    use crate::gateway::backend::{DemoBackend, FailureMode};
    use crate::gateway::policy::{Module, Verbosity};
    use crate::gateway::ratelimit::MemoryRateCounter;
    use crate::gateway::router::BackendSlot;
    use crate::observability::MemoryAuditSink;
    use std::sync::Arc;

    struct Harness {
        gateway: ExplainabilityGateway,
        audit: Arc<MemoryAuditSink>,
        primary: Arc<DemoBackend>,
        fallback: Arc<DemoBackend>,
    }

    fn setup(primary: FailureMode, fallback: FailureMode, limit: u64) -> Harness {
        let audit = Arc::new(MemoryAuditSink::new());
        let auditor = Auditor::new(audit.clone());
        let primary = Arc::new(DemoBackend::with_mode("DEMO_PRIMARY", primary));
        let fallback = Arc::new(DemoBackend::with_mode("DEMO_FALLBACK", fallback));
        let limits = RateLimitConfig::default().with_module(Module::Trading, WindowLimit::new(60, limit));

        let gateway = ExplainabilityGateway::new(
            Redactor::from_config(&RedactionConfig::default()).unwrap(),
            RateLimiter::new(Arc::new(MemoryRateCounter::new()), limits, auditor.clone()),
            ProviderRouter::new(
                BackendSlot::new("DEMO_PRIMARY", primary.clone()),
                BackendSlot::new("DEMO_FALLBACK", fallback.clone()),
            ),
            auditor,
            Duration::from_millis(500),
        );
        Harness {
            gateway,
            audit,
            primary,
            fallback,
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            template_id: TemplateId::ExplainTradingReadiness,
            template_version: 1,
            vars: TemplateVars {
                facts: json!({ "loanId": "L1", "contact": "ops@lender.com" }),
                audience: "TRADING_ANALYST".into(),
                verbosity: "STANDARD".into(),
                safety: None,
            },
            output_schema: OutputSchema::Standard,
            policy: LlmPolicy::new(Module::Trading, "TRADING_ANALYST", Verbosity::Standard),
            target: CallTarget {
                entity_type: "LOAN".into(),
                entity_id: "L1".into(),
                fact_hash: Some("abc".into()),
            },
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("t1").unwrap()
    }

    fn terminal_count(audit: &MemoryAuditSink) -> usize {
        audit.count(AuditEventType::AiCallCompleted) + audit.count(AuditEventType::AiCallFailed)
    }

    #[tokio::test]
    async fn test_primary_success() {
        let h = setup(FailureMode::Never, FailureMode::Never, 10);
        let result = h.gateway.generate(&ctx(), request()).await.unwrap();

        assert_eq!(result.backend, "DEMO_PRIMARY");
        assert_eq!(result.model, "explain-trading-v1");
        assert!(result.redaction_applied);
        assert_eq!(result.cost_usd, None);
        assert_eq!(h.fallback.calls(), 0);

        let requested = h.audit.of_type(AuditEventType::AiCallRequested);
        assert_eq!(requested.len(), 1);
        assert!(requested[0].payload["durationMs"].is_null());
        assert_eq!(requested[0].payload["backend"], "DEMO_PRIMARY");
        assert_eq!(terminal_count(&h.audit), 1);
    }

    #[tokio::test]
    async fn test_transient_primary_uses_fallback() {
        let h = setup(FailureMode::AlwaysTransient, FailureMode::Never, 10);
        let result = h.gateway.generate(&ctx(), request()).await.unwrap();

        assert_eq!(result.backend, "DEMO_FALLBACK");
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.fallback.calls(), 1);
        let completed = h.audit.of_type(AuditEventType::AiCallCompleted);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].payload["backend"], "DEMO_FALLBACK");
        assert_eq!(h.audit.count(AuditEventType::AiCallRequested), 1);
        assert_eq!(terminal_count(&h.audit), 1);
    }

    #[tokio::test]
    async fn test_both_fail() {
        let h = setup(FailureMode::AlwaysTransient, FailureMode::AlwaysPermanent, 10);
        let err = h.gateway.generate(&ctx(), request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Generation { ref backend, .. } if backend == "DEMO_FALLBACK"));

        let failed = h.audit.of_type(AuditEventType::AiCallFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].payload["backend"], "DEMO_FALLBACK");
        assert_eq!(terminal_count(&h.audit), 1);
    }

    #[tokio::test]
    async fn test_permanent_primary_skips_fallback() {
        let h = setup(FailureMode::AlwaysPermanent, FailureMode::Never, 10);
        h.gateway.generate(&ctx(), request()).await.unwrap_err();
        assert_eq!(h.fallback.calls(), 0);
        let failed = h.audit.of_type(AuditEventType::AiCallFailed);
        assert_eq!(failed[0].payload["backend"], "DEMO_PRIMARY");
        assert_eq!(failed[0].payload["errorType"], "PERMANENT_GENERATION");
    }

    #[tokio::test]
    async fn test_invalid_output_is_not_retried() {
        let h = setup(FailureMode::InvalidOutput, FailureMode::Never, 10);
        let err = h.gateway.generate(&ctx(), request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::OutputSchemaValidation(_)));
        assert_eq!(h.fallback.calls(), 0);
        assert_eq!(terminal_count(&h.audit), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_primary_times_out_to_fallback() {
        let h = setup(FailureMode::Hang, FailureMode::Never, 10);
        let result = h.gateway.generate(&ctx(), request()).await.unwrap();
        assert_eq!(result.backend, "DEMO_FALLBACK");
    }

    #[tokio::test]
    async fn test_rate_limit_denies_before_request_event() {
        let h = setup(FailureMode::Never, FailureMode::Never, 1);
        h.gateway.generate(&ctx(), request()).await.unwrap();
        let err = h.gateway.generate(&ctx(), request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.audit.count(AuditEventType::AiCallRequested), 1);
        assert_eq!(h.audit.count(AuditEventType::AiRateLimitDenied), 1);
    }

    #[tokio::test]
    async fn test_checksum_covers_redacted_prompt() {
        let h = setup(FailureMode::Never, FailureMode::Never, 10);
        let a = h.gateway.generate(&ctx(), request()).await.unwrap();

        let mut other = request();
        other.vars.facts = json!({ "loanId": "L1", "contact": "someone@else.org" });
        let b = h.gateway.generate(&ctx(), other).await.unwrap();

        assert_eq!(a.prompt_checksum, b.prompt_checksum);
    }
}
