//! # HTTP Server Module
//!
//! Axum API over the pipeline.
//!
//! # Endpoints
//!
//! - `/health` - Liveness
//! - `/api/facts/*` - Latest snapshot, history, recompute
//! - `/api/explanations/*` - Explain, latest with staleness, manual recompute
//! - `/api/impact/*` - Source-change notification and impact history
//! - `/api/ops/*` - Prompt inventory, manual tenant refresh

pub mod config;
pub mod context;
pub mod errors;
pub mod explain_routes;
pub mod fact_routes;
pub mod impact_routes;
pub mod ops_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ErrorResponse};
pub use server::HttpServer;
