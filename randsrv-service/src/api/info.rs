//! Info Endpoints
//!
//! - `/` – identifies the service
//! - `/version` – returns cargo package name, cargo package version, and the git hash of the build
//! - `/info` – returns the [`InfoResponse`] with the current epoch, the next rotation and the current public key
//! - `/public_keys` – returns the [`randsrv_types::api::EpochPublicKeyInfo`] of every remembered epoch
//!
//! The endpoints include a `Cache-Control: no-cache` header to prevent caching of responses.
use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use randsrv_types::api::InfoResponse;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::services::key_store::KeyStore;

/// Create a router containing the info endpoints.
///
/// All endpoints have `Cache-Control: no-cache` set.
pub(crate) fn routes(key_store: KeyStore, max_points: usize) -> Router {
    let public_keys_store = key_store.clone();
    Router::new()
        .route("/", get(root))
        .route("/version", get(version))
        .route("/info", get(move || info(key_store, max_points)))
        .route("/public_keys", get(move || public_keys(public_keys_store)))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
}

async fn root() -> &'static str {
    "randsrv randomness server"
}

/// Responds with cargo package name, cargo package version, and the git hash of the repository that was used to build the binary.
///
/// Returns `200 OK` with a string response.
async fn version() -> impl IntoResponse {
    (StatusCode::OK, crate::version_info())
}

/// Responds with the current epoch and when it ends.
///
/// All values are read from one snapshot.
async fn info(key_store: KeyStore, max_points: usize) -> Json<InfoResponse> {
    let snapshot = key_store.current_snapshot();
    let current = snapshot.current();
    Json(InfoResponse {
        current_epoch: current.id(),
        next_epoch_time: humantime::format_rfc3339_seconds(current.current_until()).to_string(),
        max_points,
        public_key: current.public_key().clone(),
    })
}

async fn public_keys(key_store: KeyStore) -> impl IntoResponse {
    Json(key_store.public_keys())
}
