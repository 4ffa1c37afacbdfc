#![deny(missing_docs)]
//! Core type definitions for the randomness service and its clients.
//!
//! This crate groups together the strongly-typed values and message
//! structures used across the service. It provides:
//!
//! * Thin wrappers around primitive values such as epoch ids and tags,
//!   with consistent serialization and display implementations.
//! * Cryptographic wire types (public keys, proofs, point codecs), see the
//!   [`crypto`] module.
//! * Request and response payloads of the HTTP API, see the [`api`] module.

use std::fmt;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

pub mod api;
pub mod crypto;

/// Identifies one key epoch. Epoch ids are handed out in strictly increasing order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EpochId(u64);

impl EpochId {
    /// Creates a new `EpochId` by wrapping a `u64`.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Converts the epoch id to a `u64`.
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Largest id a service may start at. Leaves room for `2^63` rotations.
    pub const MAX_FIRST: EpochId = EpochId(u64::MAX / 2);

    /// Returns the next epoch id, or `None` if the id space is exhausted.
    pub fn checked_next(self) -> Option<EpochId> {
        self.0.checked_add(1).map(Self)
    }
}

impl From<u64> for EpochId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_string())
    }
}

/// Public metadata attached to an evaluation, selecting the key component of the epoch.
///
/// The empty tag is the untagged (master) component. Tags are serialized as base64 strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(Vec<u8>);

impl Tag {
    /// The empty tag, selecting the master component.
    pub const fn untagged() -> Self {
        Self(Vec::new())
    }

    /// Creates a tag from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns `true` iff this is the empty tag.
    pub fn is_untagged(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw bytes of the tag.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Tag {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok("") => f.write_str("<untagged>"),
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => f.write_str(s),
            _ => write!(f, "b64:{}", BASE64_STANDARD.encode(&self.0)),
        }
    }
}

impl Serialize for Tag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}
