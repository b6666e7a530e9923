//! Relying-party authentication for AuthVital services.
//!
//! Backend services that accept AuthVital access tokens use this crate to
//! validate them and enforce permissions:
//!
//! 1. [`jwks::JwksCache`] fetches the provider's published keys and caches
//!    them with a TTL, refreshing once when an unknown `kid` shows up.
//! 2. [`validator::TokenValidator`] checks size, signature, and the
//!    standard claims, returning typed [`errors::ValidationFailure`]s.
//! 3. [`permissions`] answers "may this subject do X in tenant Y" using
//!    the wildcard grammar carried in `tenant_permissions`.
//!
//! [`pkce`] carries the client-side half of the login flow: verifier
//! generation, challenge derivation, and the redirect state codec.

#![warn(clippy::pedantic)]

pub mod errors;
pub mod jwks;
pub mod permissions;
pub mod pkce;
pub mod validator;

pub use errors::{Forbidden, ValidationFailure};
pub use jwks::JwksCache;
pub use pkce::RedirectState;
pub use validator::{TokenValidator, ValidatedToken, ValidatorConfig};
