use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::models::Stop;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Serialize, ToSchema)]
pub struct StopListResponse {
    pub stops: Vec<Stop>,
    /// Stops still lacking usable coordinates
    pub unresolved: usize,
}

fn list_response(stops: Vec<Stop>) -> StopListResponse {
    let unresolved = stops.iter().filter(|s| s.coordinates().is_none()).count();
    StopListResponse { stops, unresolved }
}

/// List the stop collection in its current visiting order
#[utoipa::path(
    get,
    path = "/api/stops",
    responses(
        (status = 200, description = "All stops in visiting order", body = StopListResponse)
    ),
    tag = "stops"
)]
pub async fn list_stops(State(orchestrator): State<Arc<Orchestrator>>) -> Json<StopListResponse> {
    Json(list_response(orchestrator.snapshot().await))
}

/// Reverse the pending portion of the visiting order
#[utoipa::path(
    post,
    path = "/api/stops/reverse",
    responses(
        (status = 200, description = "Collection with the pending sequence reversed", body = StopListResponse)
    ),
    tag = "stops"
)]
pub async fn reverse_stops(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Json<StopListResponse> {
    Json(list_response(orchestrator.reverse_pending().await))
}

/// Remove every stop, including completed ones
#[utoipa::path(
    delete,
    path = "/api/stops",
    responses(
        (status = 200, description = "Collection cleared", body = StopListResponse)
    ),
    tag = "stops"
)]
pub async fn clear_stops(State(orchestrator): State<Arc<Orchestrator>>) -> Json<StopListResponse> {
    orchestrator.clear_all().await;
    Json(list_response(Vec::new()))
}
