use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::orchestrator::OrchestratorError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map an orchestrator failure to its HTTP representation
pub fn error_response(e: OrchestratorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        OrchestratorError::Busy | OrchestratorError::AlreadyCompleted => StatusCode::CONFLICT,
        OrchestratorError::UnknownStop(_) => StatusCode::NOT_FOUND,
        OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
