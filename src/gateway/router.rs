//! Primary/fallback routing and per-module model selection

use std::fmt;
use std::sync::Arc;

use super::backend::GenerationBackend;
use super::policy::{LlmPolicy, Module, Verbosity};

/// A named backend
#[derive(Clone)]
pub struct BackendSlot {
    pub name: String,
    pub backend: Arc<dyn GenerationBackend>,
}

impl BackendSlot {
    pub fn new(name: impl Into<String>, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

impl fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot").field("name", &self.name).finish()
    }
}

/// Where one attempt goes
#[derive(Clone)]
pub struct RouteTarget {
    pub name: String,
    pub backend: Arc<dyn GenerationBackend>,
    pub model: String,
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTarget")
            .field("name", &self.name)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub primary: RouteTarget,
    pub fallback: RouteTarget,
}

/// Model for a policy
pub fn model_for(policy: &LlmPolicy) -> &'static str {
    match policy.module {
        Module::Trading if policy.verbosity == Verbosity::Detailed => "explain-trading-detailed-v1",
        Module::Trading => "explain-trading-v1",
        Module::Esg => "explain-esg-v1",
        Module::Servicing => "explain-covenant-v1",
        Module::Portfolio => "explain-portfolio-v1",
        Module::General => "explain-default-v1",
    }
}

#[derive(Debug, Clone)]
pub struct ProviderRouter {
    primary: BackendSlot,
    fallback: BackendSlot,
}

impl ProviderRouter {
    pub fn new(primary: BackendSlot, fallback: BackendSlot) -> Self {
        Self { primary, fallback }
    }

    /// Both targets use the same model
    pub fn route(&self, policy: &LlmPolicy) -> Route {
        let model = model_for(policy).to_string();
        Route {
            primary: RouteTarget {
                name: self.primary.name.clone(),
                backend: self.primary.backend.clone(),
                model: model.clone(),
            },
            fallback: RouteTarget {
                name: self.fallback.name.clone(),
                backend: self.fallback.backend.clone(),
                model,
            },
        }
    }
}
