use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::{error_response, ErrorResponse};
use crate::models::Stop;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotesRequest {
    /// New note text; null clears the note
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TimeWindowRequest {
    /// Window start, "HH:MM"
    pub start: String,
    /// Window end, "HH:MM"; must be after start
    pub end: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteRequest {
    /// Who received the delivery
    pub receiver: String,
    /// Optional reference to a stored proof photo
    pub photo_reference: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/stops/{id}/notes",
    request_body = NotesRequest,
    responses(
        (status = 200, description = "Updated stop", body = Stop),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn edit_notes(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<NotesRequest>,
) -> Result<Json<Stop>, (StatusCode, Json<ErrorResponse>)> {
    let stop = orchestrator
        .edit_notes(id, request.notes)
        .await
        .map_err(error_response)?;
    Ok(Json(stop))
}

/// Set a stop's delivery time window
///
/// An inverted or malformed window is rejected and the stop keeps its
/// previous window.
#[utoipa::path(
    patch,
    path = "/api/stops/{id}/time-window",
    request_body = TimeWindowRequest,
    responses(
        (status = 200, description = "Updated stop", body = Stop),
        (status = 400, description = "Malformed or inverted window", body = ErrorResponse),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn edit_time_window(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<TimeWindowRequest>,
) -> Result<Json<Stop>, (StatusCode, Json<ErrorResponse>)> {
    let stop = orchestrator
        .edit_time_window(id, &request.start, &request.end)
        .await
        .map_err(error_response)?;
    Ok(Json(stop))
}

/// Mark a stop completed with proof of delivery
#[utoipa::path(
    post,
    path = "/api/stops/{id}/complete",
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Completed stop", body = Stop),
        (status = 404, description = "Unknown stop", body = ErrorResponse),
        (status = 409, description = "Stop is already completed", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn complete_stop(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Stop>, (StatusCode, Json<ErrorResponse>)> {
    let stop = orchestrator
        .complete(id, request.receiver, request.photo_reference)
        .await
        .map_err(error_response)?;
    Ok(Json(stop))
}

/// Mark a stop skipped; it keeps its place but is ignored by planning
#[utoipa::path(
    post,
    path = "/api/stops/{id}/skip",
    responses(
        (status = 200, description = "Skipped stop", body = Stop),
        (status = 404, description = "Unknown stop", body = ErrorResponse),
        (status = 409, description = "Stop is already completed", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn skip_stop(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Stop>, (StatusCode, Json<ErrorResponse>)> {
    let stop = orchestrator.skip(id).await.map_err(error_response)?;
    Ok(Json(stop))
}

/// Duplicate a stop as a fresh pending one at the end of the order
#[utoipa::path(
    post,
    path = "/api/stops/{id}/duplicate",
    responses(
        (status = 200, description = "The new stop", body = Stop),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn duplicate_stop(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Stop>, (StatusCode, Json<ErrorResponse>)> {
    let stop = orchestrator.duplicate(id).await.map_err(error_response)?;
    Ok(Json(stop))
}

#[utoipa::path(
    delete,
    path = "/api/stops/{id}",
    responses(
        (status = 204, description = "Stop removed"),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn delete_stop(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    orchestrator.remove(id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
