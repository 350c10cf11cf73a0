//! Explanation HTTP Routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::current;
use super::errors::ApiResult;
use super::fact_routes::EntityQuery;
use crate::explain::{derive_audience, ExplainRequest, ExplainResponse, LatestExplanation, EXPLAIN_VERSION};
use crate::gateway::Verbosity;
use crate::pipeline::Pipeline;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainBody {
    #[serde(flatten)]
    pub entity: EntityQuery,
    #[serde(default)]
    pub fact_hash: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
    #[serde(default)]
    pub explain_version: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuery {
    #[serde(flatten)]
    pub entity: EntityQuery,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeBody {
    #[serde(flatten)]
    pub entity: EntityQuery,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
}

pub fn explain_routes(state: Pipeline) -> Router {
    Router::new()
        .route("/", post(explain_handler))
        .route("/latest", get(latest_handler))
        .route("/recompute", post(recompute_handler))
        .with_state(state)
}

async fn explain_handler(
    State(state): State<Pipeline>,
    Json(body): Json<ExplainBody>,
) -> ApiResult<Json<ExplainResponse>> {
    let ctx = current()?;
    let mut req = ExplainRequest::new(body.entity.to_entity()?).with_verbosity(body.verbosity.unwrap_or_default());
    req.fact_hash = body.fact_hash;
    req.audience = body.audience;
    req.explain_version = body.explain_version.unwrap_or(EXPLAIN_VERSION);

    Ok(Json(state.explain.explain(&ctx, req).await?))
}

async fn latest_handler(
    State(state): State<Pipeline>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<Json<LatestExplanation>> {
    let ctx = current()?;
    let audience = query
        .audience
        .unwrap_or_else(|| derive_audience(ctx.roles()).to_string());
    let verbosity = match query.verbosity.as_deref() {
        Some(v) => v.parse::<Verbosity>()?,
        None => Verbosity::default(),
    };

    let latest = state
        .explain
        .latest_explanation(&ctx, &query.entity.to_entity()?, &audience, verbosity)
        .await?;
    Ok(Json(latest))
}

async fn recompute_handler(
    State(state): State<Pipeline>,
    Json(body): Json<RecomputeBody>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let ctx = current()?;
    let job_id = state
        .recomputer
        .request_explain_recompute(
            &ctx,
            &body.entity.to_entity()?,
            body.audience,
            body.verbosity.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}
