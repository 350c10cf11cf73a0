//! # Job Payloads
//!
//! Contracts the pipeline enqueues. Explanation-recompute jobs name one fact
//! domain each; tenant refresh jobs recompute every domain for a tenant.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{ContextResult, RequestContext};
use crate::facts::{EntityRef, FactDomain};
use crate::gateway::Verbosity;

pub const AI_EXPLAIN_QUEUE: &str = "ai-explain";
pub const OPS_QUEUE: &str = "ops";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobName {
    TradingExplainRecompute,
    CovenantExplainRecompute,
    EsgKpiExplainRecompute,
    PortfolioRiskExplainRecompute,
    RefreshTenant,
}

impl JobName {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::TradingExplainRecompute => "TRADING_EXPLAIN_RECOMPUTE",
            JobName::CovenantExplainRecompute => "COVENANT_EXPLAIN_RECOMPUTE",
            JobName::EsgKpiExplainRecompute => "ESG_KPI_EXPLAIN_RECOMPUTE",
            JobName::PortfolioRiskExplainRecompute => "PORTFOLIO_RISK_EXPLAIN_RECOMPUTE",
            JobName::RefreshTenant => "REFRESH_TENANT",
        }
    }

    pub fn queue(&self) -> &'static str {
        match self {
            JobName::RefreshTenant => OPS_QUEUE,
            _ => AI_EXPLAIN_QUEUE,
        }
    }

    /// Explain job for a fact domain
    pub fn explain_for(domain: FactDomain) -> Self {
        match domain {
            FactDomain::Readiness => JobName::TradingExplainRecompute,
            FactDomain::Covenant => JobName::CovenantExplainRecompute,
            FactDomain::EsgKpi => JobName::EsgKpiExplainRecompute,
            FactDomain::Portfolio => JobName::PortfolioRiskExplainRecompute,
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Regenerate the explanation of one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRecomputeJob {
    pub tenant_id: String,
    #[serde(flatten)]
    pub entity: EntityRef,
    pub fact_hash: String,
    pub audience: String,
    pub verbosity: Verbosity,
    #[serde(default)]
    pub actor_user_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl ExplainRecomputeJob {
    /// Job for `entity` at `fact_hash`, attributed to the caller in `ctx`
    pub fn new(
        ctx: &RequestContext,
        entity: EntityRef,
        fact_hash: impl Into<String>,
        audience: impl Into<String>,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            tenant_id: ctx.tenant_id().to_string(),
            entity,
            fact_hash: fact_hash.into(),
            audience: audience.into(),
            verbosity,
            actor_user_id: ctx.actor_user_id().map(str::to_string),
            correlation_id: ctx.correlation_id().map(str::to_string),
        }
    }

    pub fn name(&self) -> JobName {
        JobName::explain_for(self.entity.domain())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshReason {
    Scheduled,
    Manual,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshReason::Scheduled => "SCHEDULED",
            RefreshReason::Manual => "MANUAL",
        }
    }
}

/// Recompute every fact domain of a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRefreshJob {
    pub tenant_id: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub reason: RefreshReason,
}

impl TenantRefreshJob {
    pub fn new(tenant_id: impl Into<String>, reason: RefreshReason) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            correlation_id: None,
            reason,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Job {
    ExplainRecompute(ExplainRecomputeJob),
    TenantRefresh(TenantRefreshJob),
}

impl Job {
    pub fn name(&self) -> JobName {
        match self {
            Job::ExplainRecompute(job) => job.name(),
            Job::TenantRefresh(_) => JobName::RefreshTenant,
        }
    }

    pub fn queue(&self) -> &'static str {
        self.name().queue()
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            Job::ExplainRecompute(job) => &job.tenant_id,
            Job::TenantRefresh(job) => &job.tenant_id,
        }
    }

    /// Context the job runs under
    pub fn context(&self) -> ContextResult<RequestContext> {
        match self {
            Job::ExplainRecompute(job) => {
                let ctx = RequestContext::new(&job.tenant_id)?.with_correlation_opt(job.correlation_id.clone());
                Ok(match &job.actor_user_id {
                    Some(user) => ctx.with_actor(user),
                    None => ctx,
                })
            }
            Job::TenantRefresh(job) => {
                Ok(RequestContext::new(&job.tenant_id)?.with_correlation_opt(job.correlation_id.clone()))
            }
        }
    }
}

/// Retry and retention policy for one enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Total runs including the first
    pub attempts: u32,
    /// Base of the exponential backoff
    pub backoff_delay_ms: u64,
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl JobOptions {
    pub const EXPLAIN_RECOMPUTE: JobOptions = JobOptions {
        attempts: 3,
        backoff_delay_ms: 2000,
        keep_completed: 50,
        keep_failed: 50,
    };

    pub const TENANT_REFRESH: JobOptions = JobOptions {
        attempts: 2,
        backoff_delay_ms: 3000,
        keep_completed: 50,
        keep_failed: 50,
    };

    /// Runs fired by the nightly schedule
    pub const SCHEDULED_REFRESH: JobOptions = JobOptions {
        attempts: 2,
        backoff_delay_ms: 3000,
        keep_completed: 20,
        keep_failed: 20,
    };

    /// Defaults for a job's kind
    pub fn for_job(job: &Job) -> Self {
        match job {
            Job::ExplainRecompute(_) => Self::EXPLAIN_RECOMPUTE,
            Job::TenantRefresh(t) if t.reason == RefreshReason::Scheduled => Self::SCHEDULED_REFRESH,
            Job::TenantRefresh(_) => Self::TENANT_REFRESH,
        }
    }

    /// Delay before retry number `failed_attempts` (1-based)
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_delay_ms.saturating_mul(1u64 << exp))
    }
}
