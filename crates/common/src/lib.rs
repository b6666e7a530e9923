//! Shared JWT plumbing used on both sides of the AuthVital trust boundary.
//!
//! The issuer (`idp-service`) and relying parties (`rp-auth`) agree on the
//! claim structures, token size limits, and key-encoding helpers in this
//! crate. Nothing here verifies a signature on its own; verification lives
//! with the party that holds (or fetches) the key material.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (claims, size limits, kid extraction)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
