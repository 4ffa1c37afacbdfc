//! This module provides the server-side evaluation engine. It is only available with the `server` feature.
//!
//! The engine is a pure function of a key component, a validated blinded query and the public tag:
//! it computes `Z = k⁻¹·B` and a Chaum-Pedersen proof that `log_G(K) = log_Z(B)`, where `K = k·G` is the
//! published public key of the component. The proof nonce is derived from the key, the query and the tag, so the
//! whole answer (point and proof) is a deterministic function of its inputs.
//! Key management (epochs, tags, puncturing) is the caller's business, the engine only borrows the key.

use std::fmt;

use ark_ec::{AffineRepr, CurveGroup, PrimeGroup};
use ark_ff::{Field, PrimeField, UniformRand, Zero};
use ark_serialize::CanonicalSerialize;
use rand::{CryptoRng, Rng};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::{
    dlog_equality::DLogEqualityProof,
    oprf::{Affine, BlindedOprfRequest, BlindedOprfResponse, Curve, ScalarField},
};

const NONCE_DS: &[u8] = b"RANDSRV_DLOG_EQUALITY_NONCE_V1";

/// OPRF secret key component (scalar).
///
/// This should be handled as a secret and is zeroized on drop. Deliberately neither `Clone` nor `Debug`.
#[derive(ZeroizeOnDrop)]
pub struct OprfKey(ScalarField);

impl OprfKey {
    /// Generate a random, non-zero OPRF key.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let k = ScalarField::rand(rng);
            if !k.is_zero() {
                return OprfKey(k);
            }
        }
    }

    /// Returns the public key corresponding to this OPRF secret key.
    pub fn public_key(&self) -> Affine {
        (Curve::generator() * self.0).into_affine()
    }
}

/// Failures of the evaluation engine that indicate a bug or corrupted key material.
///
/// These are never caused by client input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EvaluationFailure {
    /// The key component has no inverse (it is zero).
    NonInvertibleKey,
    /// The freshly created proof did not verify against the key's own public key.
    ProofSelfCheck,
}

impl fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationFailure::NonInvertibleKey => write!(f, "key component is not invertible"),
            EvaluationFailure::ProofSelfCheck => write!(f, "proof failed self-verification"),
        }
    }
}

impl std::error::Error for EvaluationFailure {}

/// Computes the blinded OPRF response for `query` under `key` and a proof of correct evaluation bound to `tag`.
///
/// # Errors
/// Returns an [`EvaluationFailure`] if the key is unusable or the proof does not verify. Callers must treat this as
/// fatal for the request and must not retry.
pub fn evaluate(
    key: &OprfKey,
    query: &BlindedOprfRequest,
    tag: &[u8],
) -> Result<(BlindedOprfResponse, DLogEqualityProof), EvaluationFailure> {
    let key_inv = Zeroizing::new(
        key.0
            .inverse()
            .ok_or(EvaluationFailure::NonInvertibleKey)?,
    );
    let blinded_response = (query.0 * *key_inv).into_affine();
    let nonce = derive_nonce(key, query, tag);
    let proof = DLogEqualityProof::proof_with_nonce(blinded_response, key.0, &nonce, tag);
    proof
        .verify(
            key.public_key(),
            blinded_response,
            query.0,
            Affine::generator(),
            tag,
        )
        .map_err(|_| EvaluationFailure::ProofSelfCheck)?;
    Ok((BlindedOprfResponse(blinded_response), proof))
}

/// Derives the proof nonce from the secret key, the query and the tag.
fn derive_nonce(key: &OprfKey, query: &BlindedOprfRequest, tag: &[u8]) -> Zeroizing<ScalarField> {
    let mut key_bytes = Zeroizing::new(Vec::with_capacity(key.0.compressed_size()));
    key.0
        .serialize_compressed(&mut *key_bytes)
        .expect("can serialize scalar into a vec");
    let mut query_bytes = Vec::with_capacity(query.0.compressed_size());
    query
        .0
        .serialize_compressed(&mut query_bytes)
        .expect("can serialize point into a vec");
    let mut hasher = blake3::Hasher::new();
    hasher.update(NONCE_DS);
    hasher.update(&key_bytes);
    hasher.update(&(tag.len() as u64).to_le_bytes());
    hasher.update(tag);
    hasher.update(&query_bytes);
    let mut wide = Zeroizing::new([0u8; 64]);
    hasher.finalize_xof().fill(&mut *wide);
    Zeroizing::new(ScalarField::from_le_bytes_mod_order(&*wide))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_key_is_internal_failure() {
        let key = OprfKey(ScalarField::zero());
        let query = BlindedOprfRequest::try_new(Affine::generator()).unwrap();
        assert_eq!(
            evaluate(&key, &query, b"").unwrap_err(),
            EvaluationFailure::NonInvertibleKey
        );
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let mut rng = rand::thread_rng();
        let key = OprfKey::random(&mut rng);
        let query = BlindedOprfRequest::try_new(Affine::generator()).unwrap();
        let (response, proof) = evaluate(&key, &query, b"t").unwrap();
        assert_eq!(evaluate(&key, &query, b"t").unwrap(), (response.clone(), proof.clone()));
        // the tag changes the proof, not the point
        let (other_response, other_proof) = evaluate(&key, &query, b"u").unwrap();
        assert_eq!(other_response, response);
        assert_ne!(other_proof, proof);
    }
}
