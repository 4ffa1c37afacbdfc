//! Evaluation Endpoint
//!
//! - `POST /randomness` – evaluates a batch of blinded points, see [`EvaluationRequest`].
//!
//! Points are decoded here and handed to the [`RequestGate`], which does everything else. Payload contents are
//! never logged.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use randsrv_types::{
    api::{EvaluatedPoint, EvaluationRequest, EvaluationResponse},
    crypto,
};
use tracing::instrument;

use crate::{api::errors::ApiError, services::request_gate::RequestGate};

/// Create a router containing the evaluation endpoint.
pub(crate) fn routes(request_gate: RequestGate) -> Router {
    Router::new()
        .route("/randomness", post(randomness))
        .with_state(request_gate)
}

#[instrument(level = "debug", skip_all)]
async fn randomness(
    State(request_gate): State<RequestGate>,
    payload: Result<Json<EvaluationRequest>, JsonRejection>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let Json(request) = payload.map_err(|err| ApiError::MalformedInput(err.body_text()))?;
    tracing::debug!(
        "evaluation request with {} points, tag {}, epoch {:?}",
        request.points.len(),
        request.tag,
        request.epoch
    );
    request_gate.check_batch_size(request.points.len())?;
    let points = request
        .points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            crypto::decode_point(point)
                .map_err(|err| ApiError::MalformedInput(format!("point {index}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let evaluation = request_gate
        .evaluate(request.epoch, request.tag, points)
        .await?;
    tracing::debug!(
        "evaluated {} points with epoch {}",
        evaluation.results.len(),
        evaluation.epoch
    );
    Ok(Json(EvaluationResponse {
        epoch: evaluation.epoch,
        results: evaluation
            .results
            .into_iter()
            .map(|(response, proof)| EvaluatedPoint {
                point: response.response(),
                proof: proof.into(),
            })
            .collect(),
    }))
}
