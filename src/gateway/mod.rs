//! # Explainability Gateway
//!
//! Everything between fact JSON and a validated explanation: prompt
//! registry, redaction, rate limiting, routing, backends, output schema
//! and call auditing.

pub mod backend;
pub mod cost;
pub mod errors;
pub mod policy;
pub mod prompts;
pub mod ratelimit;
pub mod redaction;
pub mod router;
pub mod schema;
pub mod service;

pub use backend::{BackendResponse, DemoBackend, FailureMode, GenerationBackend, Usage};
pub use errors::{GatewayError, GatewayResult, GenerationError};
pub use policy::{LlmPolicy, Module, Verbosity};
pub use prompts::{SafetyFlags, TemplateId, TemplateVars};
pub use ratelimit::{MemoryRateCounter, RateCounter, RateLimiter};
pub use redaction::Redactor;
pub use router::{BackendSlot, ProviderRouter};
pub use schema::{Confidence, ExplainOutput, OutputSchema};
pub use service::{CallTarget, ExplainabilityGateway, GenerateRequest, GenerateResult};
