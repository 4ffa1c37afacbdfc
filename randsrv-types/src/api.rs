//! Request and response payloads of the HTTP API.
//!
//! Blinded points in requests are carried as raw base64 strings so the service can report decoding failures as
//! [`ErrorKind::MalformedInput`] instead of a generic body rejection. Everything the service sends back is typed.

use randsrv_core::oprf::Affine;
use serde::{Deserialize, Serialize};

use crate::{
    EpochId, Tag,
    crypto::{EvaluationProof, OprfPublicKey, base64_affine},
};

/// A batched evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Blinded points, base64 encoded compressed BabyJubJub points.
    pub points: Vec<String>,
    /// The public tag of the evaluation. Defaults to the untagged component.
    #[serde(default)]
    pub tag: Tag,
    /// The epoch to evaluate under. Defaults to the current epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<EpochId>,
}

/// One evaluated point together with its proof of correct evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedPoint {
    /// The evaluated point `k⁻¹·B`.
    #[serde(with = "base64_affine")]
    pub point: Affine,
    /// Proof that the point was computed with the key behind the epoch's public key for the tag.
    pub proof: EvaluationProof,
}

/// Response to an [`EvaluationRequest`], results in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    /// The epoch that was actually used.
    pub epoch: EpochId,
    /// One result per requested point.
    pub results: Vec<EvaluatedPoint>,
}

/// Public key of a tagged component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPublicKey {
    /// The tag.
    pub tag: Tag,
    /// The public key of the tag's component.
    pub key: OprfPublicKey,
}

/// The public commitment of an epoch: the master key plus one key per configured tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochPublicKey {
    /// Public key of the untagged component.
    pub master: OprfPublicKey,
    /// Public keys of the tagged components.
    #[serde(default)]
    pub tags: Vec<TagPublicKey>,
}

impl EpochPublicKey {
    /// Returns the public key that proofs for `tag` verify against, if the epoch serves the tag.
    pub fn for_tag(&self, tag: &Tag) -> Option<OprfPublicKey> {
        if tag.is_untagged() {
            return Some(self.master);
        }
        self.tags.iter().find(|t| &t.tag == tag).map(|t| t.key)
    }
}

/// Lifecycle state of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochStatus {
    /// New evaluations default to this epoch.
    Current,
    /// No longer current, but still evaluable.
    Retained,
    /// Key material destroyed, only the public commitment remains.
    Punctured,
}

/// Public information about one epoch, as served by `/public_keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochPublicKeyInfo {
    /// The epoch.
    pub epoch: EpochId,
    /// Its public commitment.
    pub public_key: EpochPublicKey,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// End of the retention window (RFC 3339).
    pub expires_at: String,
    /// Lifecycle state.
    pub status: EpochStatus,
    /// Tags that were punctured individually.
    #[serde(default)]
    pub punctured_tags: Vec<Tag>,
}

/// Response of the `/info` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    /// The current epoch.
    pub current_epoch: EpochId,
    /// When the next rotation is scheduled (RFC 3339, seconds precision).
    pub next_epoch_time: String,
    /// Maximum number of points per request.
    pub max_points: usize,
    /// Public key of the current epoch.
    pub public_key: EpochPublicKey,
}

/// Administrative puncture request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunctureRequest {
    /// The epoch to puncture.
    pub epoch: EpochId,
    /// The tag to puncture. If absent the whole epoch is punctured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
}

/// Machine-readable error kinds returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A point could not be decoded or is not a valid group element.
    MalformedInput,
    /// The batch exceeds the configured maximum.
    TooManyPoints,
    /// The tag is not served by the epoch.
    UnknownTag,
    /// The epoch was never created or its record was evicted.
    UnknownEpoch,
    /// The epoch (or the epoch's tag) is punctured.
    PuncturedEpoch,
    /// The service is at its concurrency limit.
    RateLimited,
    /// Missing or wrong admin credentials.
    Unauthorized,
    /// The evaluation failed internally. Never caused by client input.
    InternalCryptoFailure,
    /// No epoch id is left for another rotation.
    EpochsExhausted,
}

/// Error body of every non-success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The epoch the error refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<EpochId>,
}
