//! This module provides types and functionality for creating and verifying Chaum-Pedersen proofs,
//! enabling the demonstration that two group elements are related by the same discrete logarithm
//! (i.e., knowledge of a secret x such that A = x*D and C = x*B), without revealing x itself.
//!
//! The server uses it to prove that an evaluated point was computed with the key component
//! committed to by a published public key. The Fiat-Shamir challenge additionally binds a
//! caller-supplied context (the public tag of the evaluation), so a proof produced for one tag
//! does not verify under another.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{PrimeField, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::oprf::{Affine, ScalarField};

const DLOG_DS: &[u8] = b"RANDSRV_DLOG_EQUALITY_PROOF_V1";

/// A Chaum-Pedersen discrete logarithm equality proof.
///
/// Proves in zero-knowledge that for known base points B and D the prover knows x such that A = x·D and C = x·B.
#[derive(Debug, Clone, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct DLogEqualityProof {
    /// Fiat-Shamir challenge.
    pub e: ScalarField,
    /// Proof response.
    pub s: ScalarField,
}

/// Error indicating that the DLog-Proof could not be verified.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidProof;

impl std::fmt::Display for InvalidProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid DLog equality proof")
    }
}

impl std::error::Error for InvalidProof {}

impl DLogEqualityProof {
    /// Creates a Chaum-Pedersen proof which shows that C=x*B and A=x*D share the same dlog x. D is the generator of the group.
    pub fn proof(
        b: Affine,
        x: ScalarField,
        context: &[u8],
        rng: &mut (impl CryptoRng + Rng),
    ) -> Self {
        let k = Zeroizing::new(ScalarField::rand(rng));
        Self::proof_with_nonce(b, x, &k, context)
    }

    /// Same as [`DLogEqualityProof::proof`], but with a caller-provided nonce `k`.
    ///
    /// The nonce must be secret and must never be reused for a different statement, otherwise `x` leaks.
    pub fn proof_with_nonce(b: Affine, x: ScalarField, k: &ScalarField, context: &[u8]) -> Self {
        let d = Affine::generator();
        let r1 = (d * *k).into_affine();
        let r2 = (b * *k).into_affine();
        let a = (d * x).into_affine();
        let c = (b * x).into_affine();
        let e = challenge_hash(context, [a, b, c, d, r1, r2]);
        let s = *k + e * x;
        DLogEqualityProof { e, s }
    }

    /// Takes the Chaum-Pedersen proof e,s and verifies that A=x*D and C=x*B have the same dlog x, given A,B,C,D and the context the proof was created for.
    pub fn verify(
        &self,
        a: Affine,
        b: Affine,
        c: Affine,
        d: Affine,
        context: &[u8],
    ) -> Result<(), InvalidProof> {
        // All points need to be valid curve elements.
        if [a, b, c, d]
            .iter()
            .any(|p| !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve())
        {
            return Err(InvalidProof);
        }
        if [a, b, c, d].iter().any(|p| p.is_zero()) {
            return Err(InvalidProof);
        }

        let r_1 = d * self.s - a * self.e;
        if r_1.is_zero() {
            return Err(InvalidProof);
        }
        let r_2 = b * self.s - c * self.e;
        if r_2.is_zero() {
            return Err(InvalidProof);
        }
        let e = challenge_hash(context, [a, b, c, d, r_1.into_affine(), r_2.into_affine()]);
        if e == self.e {
            Ok(())
        } else {
            Err(InvalidProof)
        }
    }
}

/// Hashes the domain separator, the length-prefixed context and the six points (canonical compressed form) to a scalar.
pub(crate) fn challenge_hash(context: &[u8], points: [Affine; 6]) -> ScalarField {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DLOG_DS);
    hasher.update(&(context.len() as u64).to_le_bytes());
    hasher.update(context);
    let mut buf = Vec::with_capacity(points[0].compressed_size());
    for point in points {
        point
            .serialize_compressed(&mut buf)
            .expect("can serialize point into a vec");
        hasher.update(&buf);
        buf.clear();
    }

    // We use 64 bytes to have enough statistical security against modulo bias
    let mut unreduced = [0u8; 64];
    hasher.finalize_xof().fill(&mut unreduced);
    ScalarField::from_le_bytes_mod_order(&unreduced)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_dlog_equality() {
        let mut rng = rand::thread_rng();
        let x = ScalarField::rand(&mut rng);
        let d = Affine::generator();
        let a = (d * x).into_affine();
        let b = Affine::rand(&mut rng);
        let c = (b * x).into_affine();

        let proof = DLogEqualityProof::proof(b, x, b"tag", &mut rng);
        assert!(proof.verify(a, b, c, d, b"tag").is_ok());
        let b2 = Affine::rand(&mut rng);
        let invalid_proof = DLogEqualityProof::proof(b2, x, b"tag", &mut rng);
        assert!(invalid_proof.verify(a, b, c, d, b"tag").is_err());
    }

    #[test]
    fn test_dlog_equality_binds_context() {
        let mut rng = rand::thread_rng();
        let x = ScalarField::rand(&mut rng);
        let d = Affine::generator();
        let a = (d * x).into_affine();
        let b = Affine::rand(&mut rng);
        let c = (b * x).into_affine();

        let proof = DLogEqualityProof::proof(b, x, b"monday", &mut rng);
        assert_eq!(proof.verify(a, b, c, d, b"tuesday"), Err(InvalidProof));
        assert_eq!(proof.verify(a, b, c, d, b""), Err(InvalidProof));
    }

    #[test]
    fn test_dlog_equality_rejects_other_key() {
        let mut rng = rand::thread_rng();
        let x = ScalarField::rand(&mut rng);
        let other = ScalarField::rand(&mut rng);
        let d = Affine::generator();
        let b = Affine::rand(&mut rng);
        let c = (b * x).into_affine();

        let proof = DLogEqualityProof::proof(b, x, b"", &mut rng);
        let other_public = (d * other).into_affine();
        assert_eq!(proof.verify(other_public, b, c, d, b""), Err(InvalidProof));
    }

    #[test]
    fn test_dlog_equality_rejects_identity() {
        let mut rng = rand::thread_rng();
        let x = ScalarField::rand(&mut rng);
        let d = Affine::generator();
        let a = (d * x).into_affine();
        let b = Affine::rand(&mut rng);

        let proof = DLogEqualityProof::proof(b, x, b"", &mut rng);
        assert_eq!(
            proof.verify(a, b, Affine::zero(), d, b""),
            Err(InvalidProof)
        );
    }
}
