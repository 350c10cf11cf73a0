//! # Explanations
//!
//! Content-addressed explanation cache over the gateway, with read-time
//! staleness against the latest fact snapshot.

pub mod audience;
pub mod errors;
pub mod record;
pub mod service;

pub use audience::derive_audience;
pub use errors::{ExplainError, ExplainResult};
pub use record::{ExplanationKey, ExplanationRecord, ExplanationStore, MemoryExplanationStore, EXPLAIN_VERSION};
pub use service::{ExplainRequest, ExplainResponse, ExplainabilityService, LatestExplanation};
