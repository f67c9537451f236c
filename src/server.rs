use axum::{
    body::Bytes,
    extract::Path,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::{DailyPricingReport, IngestService, SearchBatchReport, SummaryReport};
use crate::domain::Vehicle;
use crate::error::IngestError;

/// Error body returned by every failing endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::SchemaValidation { .. } => StatusCode::BAD_REQUEST,
            IngestError::Conflict { .. } => StatusCode::CONFLICT,
            IngestError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

/// The pipeline is synchronous and talks to SQLite, so keep it off the
/// async worker threads.
async fn run_blocking<T, F>(call: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ApiError::internal(format!("ingestion task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Health check endpoint
async fn health(Extension(service): Extension<Arc<IngestService>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "turo-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "store": service.store().backend(),
        "detail_conflict_policy": service.detail_policy().as_str(),
    }))
}

async fn ingest_search_batch(
    Extension(service): Extension<Arc<IngestService>>,
    body: Bytes,
) -> Result<Json<SearchBatchReport>, ApiError> {
    let report = run_blocking(move || service.ingest_search_batch(&body)).await?;
    Ok(Json(report))
}

async fn ingest_booking_summaries(
    Extension(service): Extension<Arc<IngestService>>,
    body: Bytes,
) -> Result<Json<SummaryReport>, ApiError> {
    let report = run_blocking(move || service.ingest_booking_summaries(&body)).await?;
    Ok(Json(report))
}

async fn ingest_daily_pricing(
    Extension(service): Extension<Arc<IngestService>>,
    body: Bytes,
) -> Result<Json<DailyPricingReport>, ApiError> {
    let report = run_blocking(move || service.ingest_daily_pricing(&body)).await?;
    Ok(Json(report))
}

async fn read_vehicle(
    Extension(service): Extension<Arc<IngestService>>,
    Path(id): Path<i64>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = run_blocking(move || service.read_vehicle(id)).await?;
    Ok(Json(vehicle))
}

/// Create the HTTP router with all routes
pub fn create_server(service: Arc<IngestService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/search-batches", post(ingest_search_batch))
        .route("/api/v1/booking-summaries", post(ingest_booking_summaries))
        .route("/api/v1/daily-pricing", post(ingest_daily_pricing))
        .route("/api/v1/vehicles/:id", get(read_vehicle))
        .layer(Extension(service))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Start the HTTP server on the specified port and run until Ctrl-C.
pub async fn start_server(service: Arc<IngestService>, port: u16) -> anyhow::Result<()> {
    let app = create_server(service);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
