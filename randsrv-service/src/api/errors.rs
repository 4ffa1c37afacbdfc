//! This module defines the [`ApiError`] the endpoints may return and how it is rendered.
//!
//! Every error is answered with an [`ErrorResponse`] body. Internal failures only carry the error id that was logged.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use randsrv_types::{
    EpochId,
    api::{ErrorKind, ErrorResponse},
};

use crate::services::{key_store::KeyStoreError, request_gate::EvaluationError};

/// All errors the endpoints may return.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error("missing or invalid admin token")]
    Unauthorized,
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::MalformedInput(_) => ErrorKind::MalformedInput,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::KeyStore(err) => key_store_error_kind(err),
            ApiError::Evaluation(err) => match err {
                EvaluationError::MalformedInput { .. } => ErrorKind::MalformedInput,
                EvaluationError::TooManyPoints { .. } => ErrorKind::TooManyPoints,
                EvaluationError::RateLimited => ErrorKind::RateLimited,
                EvaluationError::KeyStore(err) => key_store_error_kind(err),
                EvaluationError::InternalCryptoFailure { .. } => ErrorKind::InternalCryptoFailure,
            },
        }
    }

    fn epoch(&self) -> Option<EpochId> {
        let err = match self {
            ApiError::KeyStore(err) | ApiError::Evaluation(EvaluationError::KeyStore(err)) => err,
            _ => return None,
        };
        match err {
            KeyStoreError::UnknownEpoch(epoch)
            | KeyStoreError::PuncturedEpoch(epoch)
            | KeyStoreError::PuncturedTag(epoch, _)
            | KeyStoreError::UnknownTag(epoch, _) => Some(*epoch),
            KeyStoreError::EpochIdsExhausted(_) => None,
        }
    }
}

fn key_store_error_kind(err: &KeyStoreError) -> ErrorKind {
    match err {
        KeyStoreError::UnknownEpoch(_) => ErrorKind::UnknownEpoch,
        KeyStoreError::PuncturedEpoch(_) | KeyStoreError::PuncturedTag(_, _) => {
            ErrorKind::PuncturedEpoch
        }
        KeyStoreError::UnknownTag(_, _) => ErrorKind::UnknownTag,
        KeyStoreError::EpochIdsExhausted(_) => ErrorKind::EpochsExhausted,
    }
}

/// The HTTP status code of an error kind.
pub(crate) fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedInput | ErrorKind::TooManyPoints | ErrorKind::UnknownTag => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::UnknownEpoch => StatusCode::NOT_FOUND,
        ErrorKind::PuncturedEpoch => StatusCode::GONE,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::InternalCryptoFailure => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::EpochsExhausted => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        // the message may echo client input
        tracing::debug!(?kind, "request failed");
        let body = ErrorResponse {
            kind,
            message: self.to_string(),
            epoch: self.epoch(),
        };
        (status_code(kind), Json(body)).into_response()
    }
}
