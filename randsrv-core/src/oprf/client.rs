//! This module implements the client side of the protocol: blinding inputs, verifying the server's proof of
//! correct evaluation, and unblinding plus hashing the response into the final 32-byte output.
//!
//! The final output is bound to both the input and the public tag, so equal inputs under different tags never link.

use ark_ec::{AffineRepr as _, CurveGroup};
use ark_serialize::CanonicalSerialize;
use rand::{CryptoRng, Rng};

use crate::dlog_equality::{DLogEqualityProof, InvalidProof};
use crate::oprf::{
    Affine, BlindedOprfRequest, BlindedOprfResponse, BlindingFactor, PreparedBlindingFactor,
    mappings,
};

const FINALIZE_DS: &[u8] = b"RANDSRV_Finalize";

/// Length of the finalized OPRF output.
pub const OUTPUT_LEN: usize = 32;

/// Blinds `input` with a freshly sampled blinding factor.
///
/// Returns the blinded request and the blinding factor needed to unblind the response.
pub fn blind(
    input: &[u8],
    rng: &mut (impl CryptoRng + Rng),
) -> (BlindedOprfRequest, BlindingFactor) {
    let blinding_factor = BlindingFactor::rand(rng);
    (blind_with(input, &blinding_factor), blinding_factor)
}

/// Blinds `input` with the provided blinding factor.
pub fn blind_with(input: &[u8], blinding_factor: &BlindingFactor) -> BlindedOprfRequest {
    let encoded_input = mappings::hash_to_curve(input);
    BlindedOprfRequest((encoded_input * blinding_factor.beta()).into_affine())
}

/// Verifies that `response` is the evaluation of `request` under the key committed to by `public_key`, for `tag`.
pub fn verify_evaluation(
    public_key: Affine,
    request: &BlindedOprfRequest,
    response: &BlindedOprfResponse,
    proof: &DLogEqualityProof,
    tag: &[u8],
) -> Result<(), InvalidProof> {
    proof.verify(
        public_key,
        response.0,
        request.0,
        Affine::generator(),
        tag,
    )
}

/// Unblinds a response and hashes it together with the input and the tag into the final output.
pub fn finalize(
    input: &[u8],
    tag: &[u8],
    response: &BlindedOprfResponse,
    blinding_factor: PreparedBlindingFactor,
) -> [u8; OUTPUT_LEN] {
    finalize_unblinded(input, tag, response.unblind_response(&blinding_factor))
}

/// Hashes an already unblinded evaluation together with the input and the tag.
pub fn finalize_unblinded(input: &[u8], tag: &[u8], unblinded: Affine) -> [u8; OUTPUT_LEN] {
    let mut point_bytes = Vec::with_capacity(unblinded.compressed_size());
    unblinded
        .serialize_compressed(&mut point_bytes)
        .expect("can serialize point into a vec");
    let mut hasher = blake3::Hasher::new();
    hasher.update(FINALIZE_DS);
    hasher.update(&(input.len() as u64).to_le_bytes());
    hasher.update(input);
    hasher.update(&(tag.len() as u64).to_le_bytes());
    hasher.update(tag);
    hasher.update(&point_bytes);
    *hasher.finalize().as_bytes()
}

/// Verifies the proof of a response and, if valid, produces the final output.
///
/// Calls [`finalize`] after [`verify_evaluation`].
///
/// # Errors
/// Returns [`InvalidProof`] if the proof does not verify against `public_key`.
pub fn finalize_query_and_verify_proof(
    public_key: Affine,
    input: &[u8],
    tag: &[u8],
    request: &BlindedOprfRequest,
    response: &BlindedOprfResponse,
    proof: &DLogEqualityProof,
    blinding_factor: PreparedBlindingFactor,
) -> Result<[u8; OUTPUT_LEN], InvalidProof> {
    verify_evaluation(public_key, request, response, proof, tag)?;
    Ok(finalize(input, tag, response, blinding_factor))
}
