//! Fact HTTP Routes
//!
//! Latest snapshot, history and explicit recompute. Entities are addressed
//! by `kind` plus the ids that kind needs, in the query string or body.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::context::current;
use super::errors::ApiResult;
use crate::errors::FactlineError;
use crate::facts::{EntityRef, FactSnapshot};
use crate::jobs::RecomputeOutcome;
use crate::pipeline::Pipeline;

// ==================
// Request/Response Types
// ==================

/// Flat entity address: `kind` is LOAN, COVENANT, KPI or PORTFOLIO
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityQuery {
    pub kind: String,
    #[serde(default)]
    pub loan_id: Option<String>,
    #[serde(default)]
    pub covenant_id: Option<String>,
    #[serde(default)]
    pub kpi_id: Option<String>,
    #[serde(default)]
    pub portfolio_id: Option<String>,
}

fn required(field: &str, value: &Option<String>) -> Result<String, FactlineError> {
    value
        .clone()
        .ok_or_else(|| FactlineError::Validation(format!("{} is required", field)))
}

impl EntityQuery {
    pub fn to_entity(&self) -> Result<EntityRef, FactlineError> {
        let entity = match self.kind.to_ascii_uppercase().as_str() {
            "LOAN" => EntityRef::loan(required("loanId", &self.loan_id)?),
            "COVENANT" => EntityRef::covenant(
                required("loanId", &self.loan_id)?,
                required("covenantId", &self.covenant_id)?,
            ),
            "KPI" => EntityRef::kpi(required("loanId", &self.loan_id)?, required("kpiId", &self.kpi_id)?),
            "PORTFOLIO" => EntityRef::portfolio(required("portfolioId", &self.portfolio_id)?),
            other => return Err(FactlineError::Validation(format!("unknown entity kind: {}", other))),
        };
        entity.validate()?;
        Ok(entity)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestFactResponse {
    pub exists: bool,
    pub snapshot: Option<FactSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub snapshots: Vec<FactSnapshot>,
    pub total: usize,
}

// ==================
// Fact Routes
// ==================

pub fn fact_routes(state: Pipeline) -> Router {
    Router::new()
        .route("/latest", get(latest_handler))
        .route("/history", get(history_handler))
        .route("/recompute", post(recompute_handler))
        .with_state(state)
}

async fn latest_handler(
    State(state): State<Pipeline>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<Json<LatestFactResponse>> {
    let ctx = current()?;
    let snapshot = state.facts.latest(&ctx, &query.to_entity()?).await?;
    Ok(Json(LatestFactResponse {
        exists: snapshot.is_some(),
        snapshot,
    }))
}

async fn history_handler(
    State(state): State<Pipeline>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let ctx = current()?;
    let snapshots = state.facts.history(&ctx, &query.to_entity()?).await?;
    Ok(Json(HistoryResponse {
        total: snapshots.len(),
        snapshots,
    }))
}

async fn recompute_handler(
    State(state): State<Pipeline>,
    Json(body): Json<EntityQuery>,
) -> ApiResult<Json<RecomputeOutcome>> {
    let ctx = current()?;
    let outcome = state.recomputer.recompute(&ctx, &body.to_entity()?).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(kind: &str) -> EntityQuery {
        EntityQuery {
            kind: kind.into(),
            loan_id: Some("L1".into()),
            covenant_id: Some("C1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_entity_query() {
        assert_eq!(query("covenant").to_entity().unwrap(), EntityRef::covenant("L1", "C1"));
        assert_eq!(query("LOAN").to_entity().unwrap(), EntityRef::loan("L1"));
        assert!(matches!(query("KPI").to_entity(), Err(FactlineError::Validation(_))));
        assert!(matches!(query("DEAL").to_entity(), Err(FactlineError::Validation(_))));
    }
}
