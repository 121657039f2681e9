pub mod api;
mod config;
mod models;
mod orchestrator;
mod providers;
mod services;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use orchestrator::Orchestrator;

#[derive(OpenApi)]
#[openapi(
    info(title = "Route Planning API", version = "0.1.0"),
    paths(
        api::stops::list::list_stops,
        api::stops::list::reverse_stops,
        api::stops::list::clear_stops,
        api::stops::batch::add_batch,
        api::stops::edit::edit_notes,
        api::stops::edit::edit_time_window,
        api::stops::edit::complete_stop,
        api::stops::edit::skip_stop,
        api::stops::edit::duplicate_stop,
        api::stops::edit::delete_stop,
        api::optimize::optimize,
    ),
    components(schemas(
        api::ErrorResponse,
        api::stops::list::StopListResponse,
        api::stops::batch::BatchRequest,
        api::stops::edit::NotesRequest,
        api::stops::edit::TimeWindowRequest,
        api::stops::edit::CompleteRequest,
        api::optimize::OptimizeRequest,
        api::optimize::OptimizeResponse,
        models::Stop,
        models::Address,
        models::Coordinates,
        models::StopStatus,
        models::TimeWindow,
        models::RouteLeg,
        models::DeliveryProof,
        models::PlanResult,
        models::VehicleAssignment,
        orchestrator::BatchSummary,
    )),
    tags(
        (name = "stops", description = "Stop collection management"),
        (name = "optimize", description = "Route planning and leg computation")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(bind = %config.bind, "Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    let orchestrator =
        Arc::new(Orchestrator::new(&config).expect("Failed to initialize orchestrator"));

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(orchestrator))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .expect("Failed to bind server address");

    tracing::info!(bind = %config.bind, "Server running");
    tracing::info!("Swagger UI: /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Route Planning API"
}
