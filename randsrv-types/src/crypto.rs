//! Cryptographic wire types of the randomness service.
//!
//! Every curve point and proof travels as standard base64 of its canonical compressed encoding.
//!
//! Main types:
//! * [`OprfPublicKey`]
//! * [`EvaluationProof`]
//!
//! The [`base64_affine`] module can be used with `#[serde(with = ...)]` for plain points.

use std::fmt;

use ark_ec::AffineRepr as _;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use randsrv_core::{dlog_equality::DLogEqualityProof, oprf::Affine};
use serde::{Deserialize, Serialize};

/// Errors while decoding a base64 point encoding.
#[derive(Debug, thiserror::Error)]
pub enum PointDecodeError {
    /// Not valid base64.
    #[error("invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes have the wrong length.
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Length of a compressed point.
        expected: usize,
        /// Length of the decoded input.
        actual: usize,
    },
    /// The bytes are not the canonical encoding of a curve point.
    #[error("not a valid point encoding")]
    Encoding,
}

/// Size of a compressed BabyJubJub point.
pub fn compressed_point_size() -> usize {
    Affine::generator().compressed_size()
}

/// Encodes a point as base64 of its compressed form.
pub fn encode_point(point: &Affine) -> String {
    let mut bytes = Vec::with_capacity(compressed_point_size());
    point
        .serialize_compressed(&mut bytes)
        .expect("can serialize point into a vec");
    BASE64_STANDARD.encode(bytes)
}

/// Decodes a base64 compressed point.
///
/// Only checks that the encoding describes a point on the curve. Subgroup and identity checks are left to the
/// caller, which can then report them precisely.
pub fn decode_point(encoded: &str) -> Result<Affine, PointDecodeError> {
    let bytes = BASE64_STANDARD.decode(encoded)?;
    let expected = compressed_point_size();
    if bytes.len() != expected {
        return Err(PointDecodeError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Affine::deserialize_compressed_unchecked(bytes.as_slice())
        .map_err(|_| PointDecodeError::Encoding)
}

/// Decodes a base64 compressed point and checks that it lies in the prime-order subgroup.
pub fn decode_point_checked(encoded: &str) -> Result<Affine, PointDecodeError> {
    let point = decode_point(encoded)?;
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PointDecodeError::Encoding);
    }
    Ok(point)
}

/// Serde helpers for points encoded as base64 strings.
pub mod base64_affine {
    use randsrv_core::oprf::Affine;
    use serde::{Deserialize as _, Deserializer, Serializer};

    /// Serializes a point as base64 of its compressed encoding.
    pub fn serialize<S: Serializer>(point: &Affine, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_point(point))
    }

    /// Deserializes a base64 point, rejecting points outside the prime-order subgroup.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Affine, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode_point_checked(&encoded).map_err(serde::de::Error::custom)
    }
}

/// The public key of one key component, `K = k·G`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OprfPublicKey(#[serde(with = "base64_affine")] Affine);

impl OprfPublicKey {
    /// Create a new `OprfPublicKey` by wrapping a BabyJubJub point.
    pub fn new(value: Affine) -> Self {
        Self(value)
    }

    /// Gets the inner value (a BabyJubJub point in affine representation).
    pub fn inner(self) -> Affine {
        self.0
    }
}

impl From<Affine> for OprfPublicKey {
    fn from(value: Affine) -> Self {
        Self(value)
    }
}

impl fmt::Display for OprfPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_point(&self.0))
    }
}

/// A proof of correct evaluation, serialized as base64 of the compressed `(e, s)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationProof(DLogEqualityProof);

impl EvaluationProof {
    /// Gets the wrapped proof.
    pub fn inner(&self) -> &DLogEqualityProof {
        &self.0
    }

    /// Unwraps the proof.
    pub fn into_inner(self) -> DLogEqualityProof {
        self.0
    }
}

impl From<DLogEqualityProof> for EvaluationProof {
    fn from(value: DLogEqualityProof) -> Self {
        Self(value)
    }
}

impl Serialize for EvaluationProof {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut bytes = Vec::with_capacity(self.0.compressed_size());
        self.0
            .serialize_compressed(&mut bytes)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }
}

impl<'de> Deserialize<'de> for EvaluationProof {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        DLogEqualityProof::deserialize_compressed(bytes.as_slice())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}
