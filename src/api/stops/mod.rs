pub mod batch;
pub mod edit;
pub mod list;

pub use batch::*;
pub use edit::*;
pub use list::*;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(list_stops).delete(clear_stops))
        .route("/batch", post(add_batch))
        .route("/reverse", post(reverse_stops))
        .route("/{id}", delete(delete_stop))
        .route("/{id}/notes", patch(edit_notes))
        .route("/{id}/time-window", patch(edit_time_window))
        .route("/{id}/complete", post(complete_stop))
        .route("/{id}/skip", post(skip_stop))
        .route("/{id}/duplicate", post(duplicate_stop))
        .with_state(orchestrator)
}
