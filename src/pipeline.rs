//! # Pipeline
//!
//! Wires every subsystem from a [`FactlineConfig`]: state, fact store,
//! audit sink, gateway, explanation cache, job queue and impact
//! propagation. The HTTP server and CLI only talk to this.

use std::sync::Arc;
use std::time::Duration;

use crate::config::FactlineConfig;
use crate::errors::FactlineResult;
use crate::explain::{ExplainabilityService, MemoryExplanationStore};
use crate::facts::{FactService, MemoryFactStore};
use crate::gateway::{
    BackendSlot, DemoBackend, ExplainabilityGateway, MemoryRateCounter, ProviderRouter, RateLimiter, Redactor,
};
use crate::impact::{ImpactPropagator, MemoryImpactStore};
use crate::jobs::{JobProducer, JobRunner, MemoryJobQueue, Recomputer, RefreshSchedule};
use crate::observability::{AuditSink, Auditor, FileAuditSink, MemoryAuditSink};
use crate::state::MemoryLoanState;

/// Assembled pipeline. Cheap to clone; every part is shared.
#[derive(Clone)]
pub struct Pipeline {
    pub state: Arc<MemoryLoanState>,
    pub facts: Arc<FactService>,
    pub explain: Arc<ExplainabilityService>,
    pub queue: Arc<MemoryJobQueue>,
    pub producer: JobProducer,
    pub recomputer: Recomputer,
    pub impact: Arc<ImpactPropagator>,
    pub runner: Arc<JobRunner>,
    pub auditor: Auditor,
}

impl Pipeline {
    /// Build with the audit sink named by the config (memory when unset)
    pub fn from_config(config: &FactlineConfig) -> FactlineResult<Self> {
        let sink: Arc<dyn AuditSink> = match &config.audit.path {
            Some(path) => Arc::new(FileAuditSink::open(path)?),
            None => Arc::new(MemoryAuditSink::new()),
        };
        Self::with_sink(config, sink)
    }

    /// Build with an explicit audit sink
    pub fn with_sink(config: &FactlineConfig, sink: Arc<dyn AuditSink>) -> FactlineResult<Self> {
        config.validate()?;
        let auditor = Auditor::new(sink);

        let state = Arc::new(match &config.state.seed_path {
            Some(path) => MemoryLoanState::from_seed_file(path)?,
            None => MemoryLoanState::new(),
        });

        let facts = Arc::new(FactService::new(
            state.clone(),
            Arc::new(MemoryFactStore::new()),
            auditor.clone(),
            config.fact_versions,
        ));

        let gateway_config = &config.gateway;
        let gateway = Arc::new(ExplainabilityGateway::new(
            Redactor::from_config(&config.redaction)?,
            RateLimiter::new(
                Arc::new(MemoryRateCounter::new()),
                config.rate_limits.clone(),
                auditor.clone(),
            ),
            ProviderRouter::new(
                BackendSlot::new(
                    &gateway_config.primary_name,
                    Arc::new(DemoBackend::new(&gateway_config.primary_name)),
                ),
                BackendSlot::new(
                    &gateway_config.fallback_name,
                    Arc::new(DemoBackend::new(&gateway_config.fallback_name)),
                ),
            ),
            auditor.clone(),
            Duration::from_millis(gateway_config.timeout_ms),
        ));

        let explain = Arc::new(ExplainabilityService::new(
            facts.clone(),
            gateway,
            Arc::new(MemoryExplanationStore::new()),
            auditor.clone(),
        ));

        let queue = Arc::new(MemoryJobQueue::new());
        let producer = JobProducer::new(queue.clone(), auditor.clone());
        let recomputer = Recomputer::new(facts.clone(), producer.clone(), auditor.clone());
        let impact = Arc::new(ImpactPropagator::new(
            Arc::new(MemoryImpactStore::new()),
            producer.clone(),
            auditor.clone(),
        ));
        let runner = Arc::new(JobRunner::new(
            queue.clone(),
            recomputer.clone(),
            explain.clone(),
            auditor.clone(),
        ));

        tracing::info!(
            seeded = config.state.seed_path.is_some(),
            tenants = state.tenant_ids().len(),
            primary = %gateway_config.primary_name,
            fallback = %gateway_config.fallback_name,
            "pipeline assembled"
        );

        Ok(Self {
            state,
            facts,
            explain,
            queue,
            producer,
            recomputer,
            impact,
            runner,
            auditor,
        })
    }

    /// Nightly refresh for the configured tenants, or every seeded tenant
    pub fn refresh_schedule(&self, config: &FactlineConfig) -> FactlineResult<RefreshSchedule> {
        let tenants = if config.state.scheduled_tenants.is_empty() {
            self.state.tenant_ids()
        } else {
            config.state.scheduled_tenants.clone()
        };
        Ok(RefreshSchedule::nightly(tenants)?)
    }
}
