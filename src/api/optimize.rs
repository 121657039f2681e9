use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::{error_response, ErrorResponse};
use crate::models::{Coordinates, PlanResult, Stop};
use crate::orchestrator::Orchestrator;

#[derive(Debug, Deserialize, ToSchema)]
pub struct OptimizeRequest {
    /// Starting point for the route; planning and leg computation both
    /// anchor on it when present
    pub origin: Option<Coordinates>,
    /// Number of vehicles to split the pending stops over
    #[serde(default = "default_vehicles")]
    pub vehicles: u32,
}

fn default_vehicles() -> u32 {
    1
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OptimizeResponse {
    /// The reconciled collection with fresh legs on the pending sequence
    pub stops: Vec<Stop>,
    pub plan: PlanResult,
}

/// Replan the pending stops and recompute their route legs
///
/// The plan is advisory: if the planning provider is unavailable or returns
/// an unusable answer, the current order is kept and the response says so in
/// the plan rationale. No stop is ever lost or duplicated by a plan.
#[utoipa::path(
    post,
    path = "/api/optimize",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Reconciled collection and the applied plan", body = OptimizeResponse),
        (status = 409, description = "Another batch or optimize run is in progress", body = ErrorResponse)
    ),
    tag = "optimize"
)]
pub async fn optimize(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let vehicles = request.vehicles.max(1);
    let (stops, plan) = orchestrator
        .optimize(request.origin, vehicles)
        .await
        .map_err(error_response)?;
    Ok(Json(OptimizeResponse { stops, plan }))
}
