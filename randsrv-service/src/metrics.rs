//! Metrics definitions for the randomness service.
//!
//! This module defines all metrics keys used by the service and
//! provides a helper [`describe_metrics`] to set metadata for
//! each metric using the `metrics` crate.

/// Metrics key for counting successful evaluation requests.
pub const METRICS_ID_EVALUATION_SUCCESS: &str = "randsrv.evaluation.success";
/// Metrics key for the duration of successful evaluation requests.
pub const METRICS_ID_EVALUATION_DURATION: &str = "randsrv.evaluation.duration";
/// Metrics key for counting evaluated points.
pub const METRICS_ID_POINTS_EVALUATED: &str = "randsrv.evaluation.points";
/// Metrics key for counting rejected evaluation requests.
pub const METRICS_ID_EVALUATION_REJECTED: &str = "randsrv.evaluation.rejected";
/// Metrics key for counting key rotations.
pub const METRICS_ID_ROTATIONS: &str = "randsrv.keys.rotations";
/// Metrics key for counting punctures.
pub const METRICS_ID_PUNCTURES: &str = "randsrv.keys.punctures";
/// Metrics key for the number of epochs that can currently be evaluated.
pub const METRICS_ID_LIVE_EPOCHS: &str = "randsrv.keys.live";
/// Metrics key for internal cryptographic failures.
pub const METRICS_ID_CRYPTO_FAILURE: &str = "randsrv.crypto.failure";

/// Describe all metrics used by the service.
///
/// This calls the `describe_*` functions from the `metrics` crate to set metadata on the different metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(
        METRICS_ID_EVALUATION_SUCCESS,
        metrics::Unit::Count,
        "Number of successful evaluation requests"
    );

    metrics::describe_histogram!(
        METRICS_ID_EVALUATION_DURATION,
        metrics::Unit::Milliseconds,
        "Duration of successful evaluation requests"
    );

    metrics::describe_counter!(
        METRICS_ID_POINTS_EVALUATED,
        metrics::Unit::Count,
        "Number of evaluated points"
    );

    metrics::describe_counter!(
        METRICS_ID_EVALUATION_REJECTED,
        metrics::Unit::Count,
        "Number of rejected evaluation requests"
    );

    metrics::describe_counter!(
        METRICS_ID_ROTATIONS,
        metrics::Unit::Count,
        "Number of key rotations"
    );

    metrics::describe_counter!(
        METRICS_ID_PUNCTURES,
        metrics::Unit::Count,
        "Number of punctured epochs and tags"
    );

    metrics::describe_gauge!(
        METRICS_ID_LIVE_EPOCHS,
        metrics::Unit::Count,
        "Number of epochs that can be evaluated"
    );

    metrics::describe_counter!(
        METRICS_ID_CRYPTO_FAILURE,
        metrics::Unit::Count,
        "Number of internal cryptographic failures"
    )
}
