//! API module for the randomness service.
//!
//! This module defines all HTTP endpoints of the service and organizes them into submodules:
//!
//! - [`admin`] – Administrative puncturing (`/admin/puncture`), only mounted if an admin token is configured.
//! - [`errors`] – Defines the API error type and conversions from internal service errors.
//! - [`health`] – Provides health endpoints (`/health`, `/ready`).
//! - [`info`] – Info about the service (`/`, `/version`, `/info`, `/public_keys`).
//! - [`randomness`] – The evaluation endpoint (`/randomness`).

pub(crate) mod admin;
pub(crate) mod errors;
pub(crate) mod health;
pub(crate) mod info;
pub(crate) mod randomness;
