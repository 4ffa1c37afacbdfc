//! Maps arbitrary client inputs to points in the prime-order subgroup of BabyJubJub.
//!
//! Uses a try-and-increment construction: the input is hashed together with a counter to a candidate
//! y-coordinate until the curve equation has a solution for x, the cofactor is then cleared.
//! The number of iterations depends on the input, so this is only suitable for public or client-side data.

use ark_ec::AffineRepr;
use ark_ff::PrimeField;

use crate::oprf::{Affine, BaseField};

const HASH_TO_CURVE_DS: &[u8] = b"RANDSRV_HashToCurve_BabyJubJub_TAI";

/// Hashes `input` to a non-identity point of the prime-order subgroup.
pub fn hash_to_curve(input: &[u8]) -> Affine {
    let mut counter = 0u32;
    loop {
        let mut hasher = blake3::Hasher::new();
        hasher.update(HASH_TO_CURVE_DS);
        hasher.update(&(input.len() as u64).to_le_bytes());
        hasher.update(input);
        hasher.update(&counter.to_le_bytes());
        // 64 bytes for the coordinate (negligible modulo bias) and one for the sign choice
        let mut wide = [0u8; 65];
        hasher.finalize_xof().fill(&mut wide);
        let y = BaseField::from_le_bytes_mod_order(&wide[..64]);
        let greatest = wide[64] & 1 == 1;
        if let Some(candidate) = Affine::get_point_from_y_unchecked(y, greatest) {
            let point = candidate.clear_cofactor();
            if !point.is_zero() {
                return point;
            }
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_to_curve_is_deterministic() {
        assert_eq!(hash_to_curve(b"input"), hash_to_curve(b"input"));
        assert_ne!(hash_to_curve(b"input"), hash_to_curve(b"input2"));
        assert_ne!(hash_to_curve(b""), hash_to_curve(b"\0"));
    }

    #[test]
    fn test_hash_to_curve_in_subgroup() {
        for i in 0..32u8 {
            let point = hash_to_curve(&[i; 7]);
            assert!(point.is_on_curve());
            assert!(point.is_in_correct_subgroup_assuming_on_curve());
            assert!(!point.is_zero());
        }
    }
}
