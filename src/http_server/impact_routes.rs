//! Impact HTTP Routes
//!
//! Source-change notifications and impact history lookups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::current;
use super::errors::ApiResult;
use crate::impact::event::DEFAULT_LIMIT;
use crate::impact::{ImpactEvent, ImpactSource, SourceAction, SourceType};
use crate::pipeline::Pipeline;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChangedBody {
    pub source_type: SourceType,
    pub source_id: String,
    pub source_action: SourceAction,
    #[serde(default)]
    pub loan_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChangedResponse {
    pub impact_event_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ImpactEventsResponse {
    pub events: Vec<ImpactEvent>,
    pub total: usize,
}

pub fn impact_routes(state: Pipeline) -> Router {
    Router::new()
        .route("/source-changed", post(source_changed_handler))
        .route("/loans/:loan_id", get(by_loan_handler))
        .route("/sources/:source_type/:source_id", get(by_source_handler))
        .with_state(state)
}

async fn source_changed_handler(
    State(state): State<Pipeline>,
    Json(body): Json<SourceChangedBody>,
) -> ApiResult<(StatusCode, Json<SourceChangedResponse>)> {
    let ctx = current()?;
    let impact_event_id = state
        .impact
        .on_source_changed(
            &ctx,
            ImpactSource::new(body.source_type, body.source_id, body.source_action),
            body.loan_id,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SourceChangedResponse { impact_event_id })))
}

async fn by_loan_handler(
    State(state): State<Pipeline>,
    Path(loan_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ImpactEventsResponse>> {
    let ctx = current()?;
    let events = state
        .impact
        .events_for_loan(&ctx, &loan_id, query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(ImpactEventsResponse {
        total: events.len(),
        events,
    }))
}

async fn by_source_handler(
    State(state): State<Pipeline>,
    Path((source_type, source_id)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ImpactEventsResponse>> {
    let ctx = current()?;
    let source_type: SourceType = source_type.parse()?;
    let events = state
        .impact
        .events_for_source(&ctx, source_type, &source_id, query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(ImpactEventsResponse {
        total: events.len(),
        events,
    }))
}
