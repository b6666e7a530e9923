//! Access-token validation against the provider's published keys.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only EdDSA (Ed25519) is accepted
//! - `exp`, `nbf`, `iat`, `iss`, and (when configured) `aud` are checked
//! - Callers decide how much failure detail to surface; the variants here
//!   are precise for logging and metrics

use crate::errors::ValidationFailure;
use crate::jwks::{Jwk, JwksCache};
use chrono::Utc;
use common::jwt::{
    decode_ed25519_public_key_jwk, extract_kid, validate_iat, AccessClaims, JwtValidationError,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Configuration for a [`TokenValidator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Expected `iss` claim, exactly as the provider publishes it.
    pub issuer: String,

    /// Audience this service accepts. `None` skips the audience check
    /// for services that gate on permissions alone.
    pub expected_audience: Option<String>,

    /// Clock skew tolerance for `iat` validation.
    pub clock_skew: Duration,
}

impl ValidatorConfig {
    /// Config with the default 5-minute clock skew tolerance.
    #[must_use]
    pub fn new(issuer: String, expected_audience: Option<String>) -> Self {
        Self {
            issuer,
            expected_audience,
            clock_skew: common::jwt::DEFAULT_CLOCK_SKEW,
        }
    }
}

/// A token that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    /// Key ID the token was signed with.
    pub kid: String,

    /// The verified claims.
    pub claims: AccessClaims,
}

/// Validates access tokens using keys from a [`JwksCache`].
pub struct TokenValidator {
    jwks: Arc<JwksCache>,
    config: ValidatorConfig,
}

impl TokenValidator {
    #[must_use]
    pub fn new(jwks: Arc<JwksCache>, config: ValidatorConfig) -> Self {
        Self { jwks, config }
    }

    /// Validate a bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationFailure`] naming the first check that
    /// failed. Callers serving end users should collapse these to a
    /// generic unauthorized response.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<ValidatedToken, ValidationFailure> {
        let result = self.validate_inner(token).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(failure) => failure.label(),
        };
        metrics::counter!("rp_token_validations_total", "outcome" => outcome).increment(1);

        result
    }

    async fn validate_inner(&self, token: &str) -> Result<ValidatedToken, ValidationFailure> {
        // 1. Size check and kid extraction before any real parsing
        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "rp.auth.jwt", error = ?e, "Token kid extraction failed");
            match e {
                JwtValidationError::TokenTooLarge => ValidationFailure::TokenTooLarge,
                JwtValidationError::MissingKid => ValidationFailure::MissingKid,
                _ => ValidationFailure::Malformed,
            }
        })?;

        // 2. Resolve the signing key, forcing one refresh on a miss
        let jwk = self.jwks.get_key(&kid).await?;

        // 3. Signature and exp
        let claims = verify_signature(token, &jwk)?;

        // 4. iat with skew tolerance
        if let Err(e) = validate_iat(claims.iat, self.config.clock_skew) {
            tracing::debug!(target: "rp.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(ValidationFailure::NotYetValid);
        }

        // 5. nbf, when present
        if let Some(nbf) = claims.nbf {
            if nbf > Utc::now().timestamp() {
                tracing::debug!(target: "rp.auth.jwt", "Token nbf is in the future");
                return Err(ValidationFailure::NotYetValid);
            }
        }

        // 6. Issuer
        if claims.iss != self.config.issuer {
            tracing::debug!(target: "rp.auth.jwt", iss = %claims.iss, "Token issuer mismatch");
            return Err(ValidationFailure::IssuerMismatch);
        }

        // 7. Audience membership, when this service expects one
        if let Some(expected) = &self.config.expected_audience {
            if !claims.has_audience(expected) {
                tracing::debug!(target: "rp.auth.jwt", "Token audience mismatch");
                return Err(ValidationFailure::AudienceMismatch);
            }
        }

        tracing::debug!(target: "rp.auth.jwt", kid = %kid, "Token validated successfully");
        Ok(ValidatedToken { kid, claims })
    }
}

/// Verify the EdDSA signature and decode the claims.
fn verify_signature(token: &str, jwk: &Jwk) -> Result<AccessClaims, ValidationFailure> {
    if jwk.kty != "OKP" {
        tracing::warn!(target: "rp.auth.jwt", kty = %jwk.kty, "Unexpected JWK key type");
        return Err(ValidationFailure::UnsupportedAlgorithm);
    }
    if let Some(alg) = &jwk.alg {
        if alg != "EdDSA" {
            tracing::warn!(target: "rp.auth.jwt", alg = %alg, "Unexpected JWK algorithm");
            return Err(ValidationFailure::UnsupportedAlgorithm);
        }
    }

    let public_key_b64 = jwk.x.as_ref().ok_or_else(|| {
        tracing::error!(target: "rp.auth.jwt", kid = %jwk.kid, "JWK missing x field");
        ValidationFailure::JwksUnavailable("key missing public material".to_string())
    })?;

    let public_key_bytes = decode_ed25519_public_key_jwk(public_key_b64).map_err(|e| {
        tracing::error!(target: "rp.auth.jwt", error = %e, "Invalid public key encoding");
        ValidationFailure::JwksUnavailable("key material not decodable".to_string())
    })?;

    let decoding_key = DecodingKey::from_ed_der(&public_key_bytes);

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = true;
    validation.leeway = 0;
    // aud and nbf are checked manually above, with clearer failures
    validation.validate_aud = false;
    validation.validate_nbf = false;

    let token_data = decode::<AccessClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "rp.auth.jwt", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::ExpiredSignature => ValidationFailure::Expired,
            ErrorKind::InvalidSignature => ValidationFailure::BadSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                ValidationFailure::UnsupportedAlgorithm
            }
            ErrorKind::ImmatureSignature => ValidationFailure::NotYetValid,
            _ => ValidationFailure::Malformed,
        }
    })?;

    Ok(token_data.claims)
}
