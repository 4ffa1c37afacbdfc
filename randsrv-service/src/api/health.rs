//! Health Check Endpoints
//!
//! - `/health` – general health check
//! - `/ready` – readiness check (all background services started)
//!
//! The endpoints include a `Cache-Control: no-cache` header to prevent caching of responses.
use axum::{
    Router,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::StartedServices;

/// Create a router containing the health endpoints.
///
/// All endpoints have `Cache-Control: no-cache` set.
pub(crate) fn routes(started_services: StartedServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(move || ready(started_services)))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
}

/// General health check endpoint.
///
/// Returns `200 OK` with a plain `"healthy"` response.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}

/// Readiness endpoint.
///
/// Returns `200 OK` with `"ready"` once the epoch scheduler runs, `503 Service Unavailable` before.
async fn ready(started_services: StartedServices) -> impl IntoResponse {
    if started_services.all_started() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}
