//! Core services that make up the randomness service.
//!
//! # Services overview
//!
//! - [`key_store`] – holds the epoch keys and publishes consistent snapshots of them.
//! - [`request_gate`] – admits evaluation requests and runs them against one snapshot.
//! - [`epoch_scheduler`] – rotates the keys once per epoch and punctures expired epochs.

pub(crate) mod epoch_scheduler;
pub mod key_store;
pub mod request_gate;
