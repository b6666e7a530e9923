//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with AuthVital
//! usage guidance. Use these types for all bearer-shaped values: issued
//! tokens held in memory, client secrets, and raw key material.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` over a secret field gets safe logging behavior
//! automatically. Accessing the inner value requires an explicit
//! `expose_secret()` call at the use site.
//!
//! # Memory Safety
//!
//! Secrets are zeroized on drop, so sensitive data does not linger in memory
//! after use.
//!
//! # AuthVital Usage Guidelines
//!
//! Use `SecretBox<T>` for binary key material: the issuer's key store holds
//! each signing key's PKCS#8 document as a `SecretBox<Vec<u8>>`, exposed
//! only at the signing call site.
//!
//! Use `SecretString` for text-shaped secrets a service holds on to, such
//! as OAuth client secrets or a stored refresh token.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
