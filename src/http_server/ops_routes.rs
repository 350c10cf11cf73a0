//! Health, prompt inventory and manual tenant refresh

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::context::current;
use super::errors::ApiResult;
use super::explain_routes::JobAccepted;
use crate::gateway::prompts::{list_templates, TemplateInfo};
use crate::jobs::{RefreshReason, TenantRefreshJob};
use crate::pipeline::Pipeline;

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<TemplateInfo>,
}

/// Unauthenticated liveness probe
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

pub fn ops_routes(state: Pipeline) -> Router {
    Router::new()
        .route("/templates", get(templates_handler))
        .route("/refresh", post(refresh_handler))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn templates_handler() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: list_templates(),
    })
}

async fn refresh_handler(State(state): State<Pipeline>) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let ctx = current()?;
    let job = TenantRefreshJob::new(ctx.tenant_id(), RefreshReason::Manual)
        .with_correlation(ctx.correlation_id().map(str::to_string));
    let job_id = state.producer.enqueue_tenant_refresh(&ctx, job).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}
