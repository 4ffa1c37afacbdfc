//! The [`RequestGate`] coordinates evaluation requests with key rotation and puncturing.
//!
//! Every request is admitted (batch size, concurrency permit), then resolves its epoch and tag against exactly one
//! [`Snapshot`](crate::services::key_store::Snapshot) and evaluates the whole batch with the component it resolved.
//! The component is reference counted, so a rotation or puncture that happens while the batch runs neither changes
//! the key of the batch nor frees it underneath the evaluation.

use std::{sync::Arc, time::Instant};

use randsrv_core::{
    dlog_equality::DLogEqualityProof,
    oprf::{
        Affine, BlindedOprfRequest, BlindedOprfResponse, MalformedPoint,
        server::{self as engine, EvaluationFailure, OprfKey},
    },
};
use randsrv_types::{EpochId, Tag};
use tokio::sync::Semaphore;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    metrics::{
        METRICS_ID_CRYPTO_FAILURE, METRICS_ID_EVALUATION_DURATION, METRICS_ID_EVALUATION_REJECTED,
        METRICS_ID_EVALUATION_SUCCESS, METRICS_ID_POINTS_EVALUATED,
    },
    services::key_store::{KeyStore, KeyStoreError},
};

/// Errors returned by [`RequestGate::evaluate`].
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// A point is not a valid blinded query.
    #[error("point {index} is malformed: {reason}")]
    MalformedInput {
        /// Index of the offending point in the batch.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// The batch is larger than allowed.
    #[error("too many points: {actual}, allowed are at most {max}")]
    TooManyPoints {
        /// The configured maximum.
        max: usize,
        /// The size of the batch.
        actual: usize,
    },
    /// All evaluation permits are taken.
    #[error("too many concurrent evaluations")]
    RateLimited,
    /// Resolving epoch or tag failed.
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    /// The engine failed. The cause was logged together with `error_id`.
    #[error("internal cryptographic failure, error id {error_id}")]
    InternalCryptoFailure {
        /// Correlates the response with the error log.
        error_id: Uuid,
    },
}

impl EvaluationError {
    fn malformed(index: usize, reason: impl ToString) -> Self {
        Self::MalformedInput {
            index,
            reason: reason.to_string(),
        }
    }
}

/// A successfully evaluated batch.
#[derive(Debug)]
pub struct Evaluation {
    /// The epoch whose key evaluated the batch.
    pub epoch: EpochId,
    /// One result per point, in request order.
    pub results: Vec<(BlindedOprfResponse, DLogEqualityProof)>,
}

type EvaluateFn = fn(
    &OprfKey,
    &BlindedOprfRequest,
    &[u8],
) -> Result<(BlindedOprfResponse, DLogEqualityProof), EvaluationFailure>;

/// Admission and coordination point for evaluations.
#[derive(Clone)]
pub struct RequestGate {
    key_store: KeyStore,
    permits: Arc<Semaphore>,
    max_points: usize,
    engine: EvaluateFn,
}

impl RequestGate {
    /// Creates a gate over `key_store` that admits at most `max_concurrent` evaluations of at most `max_points`
    /// points each.
    pub fn new(key_store: KeyStore, max_points: usize, max_concurrent: usize) -> Self {
        Self {
            key_store,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_points,
            engine: engine::evaluate,
        }
    }

    #[cfg(test)]
    fn with_engine(self, engine: EvaluateFn) -> Self {
        Self { engine, ..self }
    }

    /// Max number of points per batch.
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Rejects a batch of `len` points if it is too large.
    ///
    /// Lets callers reject oversized batches before decoding them.
    pub fn check_batch_size(&self, len: usize) -> Result<(), EvaluationError> {
        if len > self.max_points {
            ::metrics::counter!(METRICS_ID_EVALUATION_REJECTED).increment(1);
            return Err(EvaluationError::TooManyPoints {
                max: self.max_points,
                actual: len,
            });
        }
        Ok(())
    }

    /// Evaluates a batch of points under `epoch` (or the current epoch) for `tag`.
    ///
    /// All points of the batch are evaluated with the same key component. The evaluation runs on the blocking
    /// thread pool and holds its permit and key until it is done, even if the caller stops waiting.
    ///
    /// # Errors
    ///
    /// See [`EvaluationError`].
    #[instrument(level = "debug", skip(self, points), fields(points = points.len()))]
    pub async fn evaluate(
        &self,
        epoch: Option<EpochId>,
        tag: Tag,
        points: Vec<Affine>,
    ) -> Result<Evaluation, EvaluationError> {
        self.check_batch_size(points.len())?;
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| {
                ::metrics::counter!(METRICS_ID_EVALUATION_REJECTED).increment(1);
                EvaluationError::RateLimited
            })?;

        let queries = points
            .into_iter()
            .enumerate()
            .map(|(index, point)| {
                BlindedOprfRequest::try_new(point)
                    .map_err(|err: MalformedPoint| EvaluationError::malformed(index, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // one snapshot for resolving both epoch and tag
        let (epoch, key) = {
            let snapshot = self.key_store.current_snapshot();
            let record = match epoch {
                Some(epoch) => snapshot.lookup(epoch)?,
                None => snapshot.current(),
            };
            (record.id(), record.component(&tag)?)
        };
        tracing::debug!("evaluating {} points with epoch {epoch}", queries.len());

        let start = Instant::now();
        let evaluate = self.engine;
        let results = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            queries
                .iter()
                .map(|query| evaluate(&key, query, tag.as_bytes()))
                .collect::<Result<Vec<_>, EvaluationFailure>>()
        })
        .await;

        match results {
            Ok(Ok(results)) => {
                ::metrics::counter!(METRICS_ID_EVALUATION_SUCCESS).increment(1);
                ::metrics::counter!(METRICS_ID_POINTS_EVALUATED).increment(results.len() as u64);
                ::metrics::histogram!(METRICS_ID_EVALUATION_DURATION)
                    .record(start.elapsed().as_millis() as f64);
                Ok(Evaluation { epoch, results })
            }
            Ok(Err(failure)) => Err(crypto_alarm(epoch, &failure)),
            Err(join_error) => Err(crypto_alarm(epoch, &join_error)),
        }
    }
}

/// Logs an internal cryptographic failure and returns the error reported to the client.
fn crypto_alarm(epoch: EpochId, cause: &dyn std::error::Error) -> EvaluationError {
    let error_id = Uuid::new_v4();
    tracing::error!("{error_id} - evaluation with epoch {epoch} failed: {cause}");
    ::metrics::counter!(METRICS_ID_CRYPTO_FAILURE).increment(1);
    EvaluationError::InternalCryptoFailure { error_id }
}
