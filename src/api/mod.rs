pub mod error;
pub mod optimize;
pub mod stops;
pub mod ws;

pub use error::{error_response, ErrorResponse};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .nest("/stops", stops::router(orchestrator.clone()))
        .route(
            "/optimize",
            post(optimize::optimize).with_state(orchestrator.clone()),
        )
        .route("/events", get(ws::ws_events).with_state(orchestrator))
}
