use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::{error_response, ErrorResponse};
use crate::orchestrator::{BatchSummary, Orchestrator};

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Raw postal codes, in submission order; formatting is normalized
    /// server-side
    pub codes: Vec<String>,
}

/// Submit a batch of postal codes for resolution
///
/// Codes are resolved sequentially and stops appear incrementally on the
/// events channel; the response carries the final summary. One batch at a
/// time: a second submission while one is running is rejected with 409.
#[utoipa::path(
    post,
    path = "/api/stops/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Batch finished", body = BatchSummary),
        (status = 409, description = "Another batch or optimize run is in progress", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn add_batch(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = orchestrator
        .add_batch(request.codes)
        .await
        .map_err(error_response)?;
    Ok(Json(summary))
}
