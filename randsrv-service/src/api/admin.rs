//! Admin Endpoints
//!
//! - `POST /admin/puncture` – punctures an epoch or one tag of an epoch, see [`PunctureRequest`].
//!
//! Requests must carry the configured admin token as bearer token. The token is compared in constant time.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use randsrv_types::api::PunctureRequest;
use secrecy::{ExposeSecret as _, SecretString};
use subtle::ConstantTimeEq as _;

use crate::{api::errors::ApiError, services::key_store::KeyStore};

#[derive(Clone)]
struct AdminState {
    key_store: KeyStore,
    admin_token: Arc<SecretString>,
}

/// Create a router containing the admin endpoints.
pub(crate) fn routes(key_store: KeyStore, admin_token: SecretString) -> Router {
    Router::new()
        .route("/admin/puncture", post(puncture))
        .with_state(AdminState {
            key_store,
            admin_token: Arc::new(admin_token),
        })
}

fn authorize(
    admin_token: &SecretString,
    header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> Result<(), ApiError> {
    let TypedHeader(Authorization(bearer)) = header.map_err(|_| ApiError::Unauthorized)?;
    if bool::from(
        bearer
            .token()
            .as_bytes()
            .ct_eq(admin_token.expose_secret().as_bytes()),
    ) {
        Ok(())
    } else {
        tracing::warn!("rejected admin request with wrong token");
        Err(ApiError::Unauthorized)
    }
}

/// Punctures the requested epoch (or tag).
///
/// Returns `204 No Content` on success, including when it was already punctured.
async fn puncture(
    State(state): State<AdminState>,
    header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    payload: Result<Json<PunctureRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    authorize(&state.admin_token, header)?;
    let Json(request) = payload.map_err(|err| ApiError::MalformedInput(err.body_text()))?;
    tracing::info!(
        "admin puncture of epoch {}, tag {:?}",
        request.epoch,
        request.tag
    );
    state.key_store.puncture(request.epoch, request.tag)?;
    Ok(StatusCode::NO_CONTENT)
}
