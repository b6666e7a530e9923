//! Error types for token validation and permission enforcement.
//!
//! `ValidationFailure` variants are precise so callers can log and meter
//! the real cause; anything surfaced to an end user should collapse to a
//! generic 401 message.

use thiserror::Error;

/// Why an access token was rejected.
#[derive(Debug, Error)]
pub enum ValidationFailure {
    /// Token exceeds the size cap and was rejected before parsing.
    #[error("Token exceeds maximum allowed size")]
    TokenTooLarge,

    /// Token is not three base64url segments of valid JSON.
    #[error("Token is malformed")]
    Malformed,

    /// Token or key advertises an algorithm other than EdDSA.
    #[error("Token algorithm is not supported")]
    UnsupportedAlgorithm,

    /// Header carries no usable `kid`.
    #[error("Token header is missing a key identifier")]
    MissingKid,

    /// The `kid` is absent from the key set even after a forced refresh.
    #[error("Token key identifier is not in the published key set")]
    UnknownKey,

    /// Signature does not verify against the published key.
    #[error("Token signature verification failed")]
    BadSignature,

    /// The `exp` claim is in the past.
    #[error("Token has expired")]
    Expired,

    /// The `nbf` claim is in the future.
    #[error("Token is not yet valid")]
    NotYetValid,

    /// The `iss` claim does not match the configured issuer.
    #[error("Token issuer mismatch")]
    IssuerMismatch,

    /// The `aud` claim does not include the expected audience.
    #[error("Token audience mismatch")]
    AudienceMismatch,

    /// The key set could not be fetched or parsed.
    #[error("Key set is unavailable: {0}")]
    JwksUnavailable(String),
}

impl ValidationFailure {
    /// Label for metrics and structured logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::TokenTooLarge => "token_too_large",
            Self::Malformed => "malformed",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::MissingKid => "missing_kid",
            Self::UnknownKey => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::JwksUnavailable(_) => "jwks_unavailable",
        }
    }
}

/// Why an authenticated subject was denied an operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Forbidden {
    /// None of the subject's grants cover the required permission.
    #[error("Missing required permission: {required}")]
    MissingPermission { required: String },

    /// The token's tenant does not match the resource's tenant.
    #[error("Token is not scoped to this tenant")]
    TenantMismatch,

    /// The token carries no tenant context at all.
    #[error("Authentication required")]
    Unauthenticated,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(ValidationFailure::Expired.label(), "expired");
        assert_eq!(ValidationFailure::UnknownKey.label(), "unknown_key");
        assert_eq!(
            ValidationFailure::JwksUnavailable("timeout".to_string()).label(),
            "jwks_unavailable"
        );
    }

    #[test]
    fn test_forbidden_messages_do_not_leak_grants() {
        let err = Forbidden::MissingPermission {
            required: "members:write".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required permission: members:write");
        assert_eq!(
            Forbidden::TenantMismatch.to_string(),
            "Token is not scoped to this tenant"
        );
    }
}
