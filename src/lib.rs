//! factline - deterministic fact snapshots with cached, audited explanations
//!
//! Source mutation → impact propagation → fact recompute → drift check →
//! explanation recompute through the gateway → content-addressed cache.

pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod explain;
pub mod facts;
pub mod gateway;
pub mod hashing;
pub mod http_server;
pub mod impact;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod state;

pub use errors::{FactlineError, FactlineResult};
pub use pipeline::Pipeline;
