#![deny(missing_docs)]
//! This crate implements the cryptographic core of the randomness service: a verifiable,
//! partially-oblivious PRF over the BabyJubJub curve.
//!
//! Modules include:
//! - **oprf**: Blinded OPRF protocol types, client helpers and (under the `server` feature) the evaluation engine.
//! - **dlog_equality**: Chaum-Pedersen proofs for discrete log equality, binding an evaluation to a published key.
pub mod dlog_equality;
pub mod oprf;
