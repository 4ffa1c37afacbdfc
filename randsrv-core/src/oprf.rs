//! This module defines the core functionality of the partially-oblivious PRF.
//!
//! It provides types for representing client queries, blinding factors, and blinded server responses.
//!
//! Blinding is used to ensure the server cannot learn the client's input. The client maps its input to the curve,
//! multiplies it by a random blinding factor and sends the result. The server answers with `k⁻¹·B` for the key
//! component `k` selected by the public tag, and the client removes the blinding factor to recover `k⁻¹·H(input)`.
//!
//! See the [`client`] module for client-side helpers, and the `server` module (when enabled) for the evaluation engine.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, UniformRand, Zero};
use rand::{CryptoRng, Rng};

/// An affine BabyJubJub point.
pub type Affine = ark_babyjubjub::EdwardsAffine;
/// The base field of BabyJubJub.
pub type BaseField = ark_babyjubjub::Fq;
/// The BabyJubJub curve in projective representation.
pub type Curve = ark_babyjubjub::EdwardsProjective;
/// The scalar field of the prime-order subgroup of BabyJubJub.
pub type ScalarField = ark_babyjubjub::Fr;

pub mod client;
pub mod mappings;
#[cfg(feature = "server")]
pub mod server;

/// Reasons why a point is not accepted as a blinded query.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MalformedPoint {
    /// The point does not satisfy the curve equation.
    NotOnCurve,
    /// The point is on the curve, but not in the prime-order subgroup.
    NotInSubgroup,
    /// The point is the identity element.
    Identity,
}

impl std::fmt::Display for MalformedPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedPoint::NotOnCurve => write!(f, "point is not on the curve"),
            MalformedPoint::NotInSubgroup => write!(f, "point is not in the prime-order subgroup"),
            MalformedPoint::Identity => write!(f, "point must not be the identity"),
        }
    }
}

impl std::error::Error for MalformedPoint {}

/// A blinded OPRF client request, containing the curve point encoding the blinded query.
///
/// Can only be constructed from a point on the curve, in the prime-order subgroup and not the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindedOprfRequest(Affine);

impl BlindedOprfRequest {
    /// Construct a new [`BlindedOprfRequest`] from an affine point.
    ///
    /// # Errors
    /// Returns a [`MalformedPoint`] if the point is not a valid, non-identity element of the prime-order subgroup.
    pub fn try_new(value: Affine) -> Result<Self, MalformedPoint> {
        if !value.is_on_curve() {
            return Err(MalformedPoint::NotOnCurve);
        }
        if !value.is_in_correct_subgroup_assuming_on_curve() {
            return Err(MalformedPoint::NotInSubgroup);
        }
        if value.is_zero() {
            return Err(MalformedPoint::Identity);
        }
        Ok(Self(value))
    }

    /// Returns the blinded query as an affine curve point.
    pub fn blinded_query(&self) -> Affine {
        self.0
    }
}

/// The OPRF query blinding factor.
///
/// The blinding factor is never zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindingFactor(ScalarField);

/// Error indicating an invalid blinding factor (it may not be zero).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidBlindingFactor;

impl std::fmt::Display for InvalidBlindingFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid blinding factor, may not be zero")
    }
}

impl std::error::Error for InvalidBlindingFactor {}

impl BlindingFactor {
    /// Generate a new random, non-zero blinding factor using the provided RNG.
    pub fn rand<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let beta = ScalarField::rand(rng);
            if !beta.is_zero() {
                return Self(beta);
            }
        }
    }

    /// Construct a new [`BlindingFactor`] from a scalar value.
    ///
    /// Strongly prefer using [`BlindingFactor::rand`] and only use this method
    /// if you have a specific need for constructing a [`BlindingFactor`] directly.
    ///
    /// # Errors
    /// Returns [`InvalidBlindingFactor`] if the provided value is zero.
    pub fn from_scalar(value: ScalarField) -> Result<Self, InvalidBlindingFactor> {
        if value.is_zero() {
            return Err(InvalidBlindingFactor);
        }
        Ok(Self(value))
    }

    /// Prepare the blinding factor for unblinding (by inverting the blinding scalar).
    pub fn prepare(self) -> PreparedBlindingFactor {
        PreparedBlindingFactor(
            self.0
                .inverse()
                .expect("Blinding factor is non-zero by construction"),
        )
    }

    /// Returns the (non-inverted) blinding factor.
    pub fn beta(&self) -> ScalarField {
        self.0
    }
}

/// Prepared blinding factor, storing the inverse for unblinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBlindingFactor(ScalarField);

impl PreparedBlindingFactor {
    /// Returns the (inverted) blinding factor.
    pub fn beta_inv(&self) -> ScalarField {
        self.0
    }
}

/// The blinded OPRF response from the server, as an affine curve point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindedOprfResponse(Affine);

impl BlindedOprfResponse {
    /// Construct a new blinded response from an affine point.
    pub fn new(p: Affine) -> Self {
        Self(p)
    }

    /// Unblind the server response using the prepared blinding factor.
    pub fn unblind_response(&self, blinding_factor: &PreparedBlindingFactor) -> Affine {
        (self.0 * blinding_factor.beta_inv()).into_affine()
    }

    /// Return the affine curve point of the response.
    pub fn response(&self) -> Affine {
        self.0
    }
}

#[cfg(test)]
#[cfg(feature = "server")]
mod tests {
    use crate::oprf::{
        self,
        server::{self as engine, OprfKey},
    };

    use super::*;

    #[test]
    fn test_oprf_determinism() {
        let mut rng = rand::thread_rng();
        let key = OprfKey::random(&mut rng);
        let input = b"https://example.com/some/url";
        let tag = b"2024-03";

        let (request, blinding_factor) = oprf::client::blind(input, &mut rng);
        let (request2, blinding_factor2) = oprf::client::blind(input, &mut rng);
        assert_ne!(request, request2);

        let (response, _) = engine::evaluate(&key, &request, tag).unwrap();
        let (response2, _) = engine::evaluate(&key, &request2, tag).unwrap();
        let output = oprf::client::finalize(input, tag, &response, blinding_factor.prepare());
        let output2 = oprf::client::finalize(input, tag, &response2, blinding_factor2.prepare());
        assert_eq!(output, output2);

        // evaluating the unblinded query directly yields the same point
        let direct =
            BlindedOprfRequest::try_new(oprf::mappings::hash_to_curve(input)).unwrap();
        let (direct_response, _) = engine::evaluate(&key, &direct, tag).unwrap();
        assert_eq!(
            oprf::client::finalize_unblinded(input, tag, direct_response.response()),
            output
        );

        // same blinded point, same answer including the proof
        let (_, proof) = engine::evaluate(&key, &request, tag).unwrap();
        let (again, again_proof) = engine::evaluate(&key, &request, tag).unwrap();
        assert_eq!(again, response);
        assert_eq!(again_proof, proof);
    }

    #[test]
    fn test_oprf_with_proof() {
        let mut rng = rand::thread_rng();
        let key = OprfKey::random(&mut rng);
        let other_key = OprfKey::random(&mut rng);
        let input = b"some_test_input";
        let tag = b"t";

        let (request, blinding_factor) = oprf::client::blind(input, &mut rng);
        let (response, proof) = engine::evaluate(&key, &request, tag).unwrap();

        oprf::client::finalize_query_and_verify_proof(
            key.public_key(),
            input,
            tag,
            &request,
            &response,
            &proof,
            blinding_factor.clone().prepare(),
        )
        .unwrap();

        // proof must not verify under another key or another tag
        oprf::client::verify_evaluation(other_key.public_key(), &request, &response, &proof, tag)
            .unwrap_err();
        oprf::client::verify_evaluation(key.public_key(), &request, &response, &proof, b"u")
            .unwrap_err();
    }

    #[test]
    fn test_different_keys_give_different_outputs() {
        let mut rng = rand::thread_rng();
        let key = OprfKey::random(&mut rng);
        let other_key = OprfKey::random(&mut rng);
        let (request, _) = oprf::client::blind(b"input", &mut rng);
        let (response, _) = engine::evaluate(&key, &request, b"").unwrap();
        let (other_response, _) = engine::evaluate(&other_key, &request, b"").unwrap();
        assert_ne!(response, other_response);
    }

    #[test]
    fn test_rejects_malformed_points() {
        assert_eq!(
            BlindedOprfRequest::try_new(Affine::zero()),
            Err(MalformedPoint::Identity)
        );
        assert_eq!(
            BlindedOprfRequest::try_new(Affine::new_unchecked(
                BaseField::from(1u64),
                BaseField::from(2u64)
            )),
            Err(MalformedPoint::NotOnCurve)
        );
        // (0, -1) is the point of order two
        assert_eq!(
            BlindedOprfRequest::try_new(Affine::new_unchecked(
                BaseField::zero(),
                -BaseField::from(1u64)
            )),
            Err(MalformedPoint::NotInSubgroup)
        );
        assert!(BlindedOprfRequest::try_new(Affine::generator()).is_ok());
    }

    #[test]
    fn test_blinding_factor_zero() {
        assert_eq!(
            BlindingFactor::from_scalar(ScalarField::zero()),
            Err(InvalidBlindingFactor)
        );
    }
}
