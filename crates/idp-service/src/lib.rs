//! AuthVital Identity Provider service library.
//!
//! Token lifecycle and access-decision core for the AuthVital platform:
//! signing-key rotation, JWKS publication, the authorization-code flow with
//! PKCE, and issuance of access, refresh, and identity tokens.
//!
//! # Modules
//!
//! - `config` - Service configuration and the registered client table
//! - `crypto` - Cryptographic operations (keypair generation, JWT signing, PKCE)
//! - `errors` - Error types with OAuth-style HTTP responses
//! - `keystore` - In-process signing-key set with rotation lifecycle
//! - `oauth` - Authorization-code flow and the login boundary
//! - `services` - Token issuance
//! - `handlers` / `routes` - HTTP surface
//! - `models` - Wire types (JWKS, token responses, discovery document)

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod keystore;
pub mod models;
pub mod oauth;
pub mod observability;
pub mod routes;
pub mod services;
