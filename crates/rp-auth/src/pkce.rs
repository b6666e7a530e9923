//! Client-side PKCE: verifier generation, challenge derivation, and the
//! redirect state codec.
//!
//! The relying party keeps no server-side record between sending the
//! browser to the provider and handling the callback: the CSRF nonce and
//! the PKCE verifier travel through the `state` parameter as
//! `"{nonce}:{base64url(verifier)}"`. Decoding is the exact inverse of
//! encoding and rejects anything malformed outright; a partially-decoded
//! state is never returned.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Entropy of a generated verifier (256 bits, 43 chars base64url).
const VERIFIER_BYTES: usize = 32;

/// Errors from [`RedirectState::decode`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateDecodeError {
    #[error("State parameter is missing the separator")]
    MissingSeparator,

    #[error("State parameter has an empty nonce")]
    EmptyNonce,

    #[error("State parameter has an empty verifier")]
    EmptyVerifier,

    #[error("State parameter verifier is not valid base64url or UTF-8")]
    InvalidEncoding,
}

/// The system RNG failed to produce verifier entropy.
#[derive(Error, Debug)]
#[error("System RNG failure")]
pub struct VerifierGenerationError;

/// Generate a fresh PKCE code verifier (RFC 7636 section 4.1).
///
/// # Errors
///
/// Returns [`VerifierGenerationError`] if the system RNG fails.
pub fn generate_verifier() -> Result<String, VerifierGenerationError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; VERIFIER_BYTES];
    rng.fill(&mut bytes).map_err(|_| VerifierGenerationError)?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

/// Derive the S256 code challenge for a verifier (RFC 7636 section 4.2).
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// The state a client round-trips through the authorization redirect.
///
/// The nonce binds the callback to the browser session that started the
/// flow; the verifier is the PKCE secret revealed only at the token
/// endpoint. Nonces never contain `:` (they are UUIDs), which is what makes
/// the encoding invertible.
#[derive(Clone, PartialEq, Eq)]
pub struct RedirectState {
    pub csrf_nonce: String,
    pub pkce_verifier: String,
}

impl fmt::Debug for RedirectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectState")
            .field("csrf_nonce", &self.csrf_nonce)
            .field("pkce_verifier", &"[REDACTED]")
            .finish()
    }
}

impl RedirectState {
    /// Create a state with a fresh UUID nonce for the given verifier.
    #[must_use]
    pub fn new(pkce_verifier: String) -> Self {
        Self {
            csrf_nonce: Uuid::new_v4().to_string(),
            pkce_verifier,
        }
    }

    /// Encode as `"{nonce}:{base64url(verifier)}"`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}:{}",
            self.csrf_nonce,
            URL_SAFE_NO_PAD.encode(self.pkce_verifier.as_bytes())
        )
    }

    /// Decode a state string; exact inverse of [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns `StateDecodeError` for a missing separator, empty nonce or
    /// verifier, or a verifier that is not valid base64url / UTF-8.
    pub fn decode(raw: &str) -> Result<Self, StateDecodeError> {
        let (nonce, verifier_b64) = raw
            .split_once(':')
            .ok_or(StateDecodeError::MissingSeparator)?;

        if nonce.is_empty() {
            return Err(StateDecodeError::EmptyNonce);
        }
        if verifier_b64.is_empty() {
            return Err(StateDecodeError::EmptyVerifier);
        }

        let verifier_bytes = URL_SAFE_NO_PAD
            .decode(verifier_b64)
            .map_err(|_| StateDecodeError::InvalidEncoding)?;

        let pkce_verifier =
            String::from_utf8(verifier_bytes).map_err(|_| StateDecodeError::InvalidEncoding)?;

        if pkce_verifier.is_empty() {
            return Err(StateDecodeError::EmptyVerifier);
        }

        Ok(Self {
            csrf_nonce: nonce.to_string(),
            pkce_verifier,
        })
    }
}
