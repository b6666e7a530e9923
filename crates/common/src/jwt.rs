//! JWT utilities shared between the AuthVital issuer and relying parties.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Key ID extraction from JWT headers
//! - The stable claim structures for access, refresh, and identity tokens
//! - Ed25519 public-key decoding helpers (PEM and JWK `x` forms)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only EdDSA (Ed25519) signatures are used anywhere in the platform
//! - Generic error messages prevent information leakage
//! - `sub` and `email` claim fields are redacted in Debug output

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical access tokens in this platform run 600-1200
/// bytes even with a full tenant permission set; 8KB leaves generous headroom
/// while keeping oversized inputs cheap to reject.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
///
/// Accounts for clock drift between the issuer and relying parties. Tokens
/// with `iat` timestamps more than this amount in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Guards against misconfiguration weakening the iat check.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Value of the `token_type` claim carried by refresh tokens.
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT pre-validation.
///
/// Note: error messages are intentionally generic to prevent information
/// leakage. Details are logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing the required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// License entitlement claims embedded in access tokens.
///
/// Relying parties gate feature access on `features`; `license_type` and
/// `name` are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseClaims {
    /// License tier identifier, e.g. `"enterprise"`.
    #[serde(rename = "type")]
    pub license_type: String,

    /// Human-readable license name.
    pub name: String,

    /// Feature flags unlocked by this license.
    #[serde(default)]
    pub features: Vec<String>,
}

/// Access token claims.
///
/// This is the stable contract between the issuer and every relying party:
/// registered claims plus the tenant context and permission grants the
/// subject held at issuance. Tenant fields are absent for app-level logins
/// that are not scoped to a tenant.
///
/// # Security
///
/// `sub` and `email` are redacted in Debug output to keep principals out of
/// logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (stable user identifier) - redacted in Debug output.
    pub sub: String,

    /// Primary email of the subject - redacted in Debug output.
    pub email: String,

    /// Issuer URL.
    pub iss: String,

    /// Audience list (client ids / API identifiers).
    pub aud: Vec<String>,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Not-before timestamp (Unix epoch seconds), if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Tenant the login was scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Subdomain of the tenant the login was scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_subdomain: Option<String>,

    /// Roles held within the tenant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tenant_roles: Vec<String>,

    /// Permission grants within the tenant (`resource:action` strings,
    /// possibly with wildcard segments).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tenant_permissions: Vec<String>,

    /// Application-level roles independent of any tenant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_roles: Vec<String>,

    /// License entitlements, if the subject's tenant carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseClaims>,
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("sub", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("tenant_id", &self.tenant_id)
            .field("tenant_subdomain", &self.tenant_subdomain)
            .field("tenant_roles", &self.tenant_roles)
            .field("tenant_permissions", &self.tenant_permissions)
            .field("app_roles", &self.app_roles)
            .field("license", &self.license)
            .finish()
    }
}

impl AccessClaims {
    /// Check whether the token was issued for the given audience.
    #[must_use]
    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }

    /// Check whether the token is scoped to the given tenant.
    #[must_use]
    pub fn is_tenant(&self, tenant_id: &str) -> bool {
        self.tenant_id.as_deref() == Some(tenant_id)
    }
}

/// Refresh token claims.
///
/// Refresh tokens carry no permission data. The `sid` (session id) is the
/// unit of revocation: a revoked session invalidates every refresh token
/// minted for it.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (stable user identifier) - redacted in Debug output.
    pub sub: String,

    /// Issuer URL.
    pub iss: String,

    /// Audience list.
    pub aud: Vec<String>,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Session id this refresh token belongs to.
    pub sid: Uuid,

    /// Discriminator, always [`REFRESH_TOKEN_TYPE`]. Prevents a refresh
    /// token from passing where an access token is expected.
    pub token_type: String,

    /// Tenant the session was scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl fmt::Debug for RefreshClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshClaims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("sid", &self.sid)
            .field("token_type", &self.token_type)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl RefreshClaims {
    /// True if the `token_type` discriminator marks this as a refresh token.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.token_type == REFRESH_TOKEN_TYPE
    }
}

/// OIDC identity token claims.
///
/// Profile data only; identity tokens carry no permission or tenant grants
/// and must never be used for authorization decisions.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (stable user identifier) - redacted in Debug output.
    pub sub: String,

    /// Issuer URL.
    pub iss: String,

    /// Audience list.
    pub aud: Vec<String>,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Primary email of the subject - redacted in Debug output.
    pub email: String,

    /// Display name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl fmt::Debug for IdentityClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClaims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("email", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// Used to look up the correct verification key when multiple keys are valid
/// at once (i.e. during key rotation).
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
/// - The token MUST still be verified after fetching the key
/// - The `kid` value should only be used for lookup in a trusted JWKS
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not three dot-separated parts, bad base64, or bad JSON
/// - `MissingKid` - header has no `kid`, or `kid` is empty / not a string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    // Reject empty kid values as well as missing ones
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(kid)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` too far in the future, which could indicate a
/// pre-generated token, clock drift beyond tolerance, or manipulation.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode an Ed25519 public key from PEM format.
///
/// Strips the PEM header/footer lines and decodes the base64 content.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64 content cannot be decoded.
pub fn decode_ed25519_public_key_pem(pem: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let b64: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64)
}

/// Decode an Ed25519 public key from a JWK `x` field (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64url content cannot be decoded.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    fn sample_access_claims() -> AccessClaims {
        AccessClaims {
            sub: "usr_0192".to_string(),
            email: "ada@initech.example".to_string(),
            iss: "https://auth.initech.example".to_string(),
            aud: vec!["initech-web".to_string()],
            iat: 1_700_000_000,
            exp: 1_700_003_600,
            nbf: None,
            tenant_id: Some("tnt_8842".to_string()),
            tenant_subdomain: Some("initech".to_string()),
            tenant_roles: vec!["admin".to_string()],
            tenant_permissions: vec!["members:invite".to_string(), "licenses:*".to_string()],
            app_roles: vec![],
            license: Some(LicenseClaims {
                license_type: "enterprise".to_string(),
                name: "Enterprise Annual".to_string(),
                features: vec!["sso".to_string(), "scim".to_string()],
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_clock_skew_is_5_minutes() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
    }

    // -------------------------------------------------------------------------
    // extract_kid Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_kid_valid_token() {
        let header = r#"{"alg":"EdDSA","typ":"JWT","kid":"idp-2026-01"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = extract_kid(&token);
        assert_eq!(result.unwrap(), "idp-2026-01");
    }

    #[test]
    fn test_extract_kid_missing_kid() {
        let header = r#"{"alg":"EdDSA","typ":"JWT"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = extract_kid(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingKid)));
    }

    #[test]
    fn test_extract_kid_empty_kid() {
        let header = r#"{"alg":"EdDSA","typ":"JWT","kid":""}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = extract_kid(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingKid)));
    }

    #[test]
    fn test_extract_kid_malformed_token() {
        let result = extract_kid("not-a-jwt");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_extract_kid_invalid_base64() {
        let result = extract_kid("!!!invalid!!!.payload.signature");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_extract_kid_invalid_json() {
        let header_b64 = URL_SAFE_NO_PAD.encode("not-json");
        let token = format!("{header_b64}.payload.signature");

        let result = extract_kid(&token);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_extract_kid_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = extract_kid(&oversized);
        assert!(matches!(result, Err(JwtValidationError::TokenTooLarge)));
    }

    #[test]
    fn test_extract_kid_non_string_kid() {
        let header = r#"{"alg":"EdDSA","typ":"JWT","kid":12345}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = extract_kid(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingKid)));
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_past_time() {
        let past = chrono::Utc::now().timestamp() - 3600;
        assert!(validate_iat(past, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_within_clock_skew() {
        let future = chrono::Utc::now().timestamp() + 200;
        assert!(validate_iat(future, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());

        // iat == now + skew + 1 is the first rejected value
        assert!(matches!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    // -------------------------------------------------------------------------
    // Claims Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_access_claims_debug_redacts_identity() {
        let claims = sample_access_claims();
        let debug_str = format!("{claims:?}");

        assert!(!debug_str.contains("usr_0192"));
        assert!(!debug_str.contains("ada@initech.example"));
        assert!(debug_str.contains("[REDACTED]"));
        // Non-identifying fields remain visible
        assert!(debug_str.contains("tnt_8842"));
    }

    #[test]
    fn test_access_claims_audience_check() {
        let claims = sample_access_claims();
        assert!(claims.has_audience("initech-web"));
        assert!(!claims.has_audience("initech-api"));
    }

    #[test]
    fn test_access_claims_tenant_check() {
        let claims = sample_access_claims();
        assert!(claims.is_tenant("tnt_8842"));
        assert!(!claims.is_tenant("tnt_0001"));

        let mut app_level = claims;
        app_level.tenant_id = None;
        assert!(!app_level.is_tenant("tnt_8842"));
    }

    #[test]
    fn test_access_claims_round_trip() {
        let claims = sample_access_claims();
        let json = serde_json::to_string(&claims).unwrap();
        let back: AccessClaims = serde_json::from_str(&json).unwrap();

        assert_eq!(back.sub, claims.sub);
        assert_eq!(back.tenant_permissions, claims.tenant_permissions);
        assert_eq!(back.license, claims.license);
    }

    #[test]
    fn test_access_claims_empty_collections_omitted() {
        let mut claims = sample_access_claims();
        claims.tenant_roles = vec![];
        claims.tenant_permissions = vec![];
        claims.license = None;

        let json = serde_json::to_string(&claims).unwrap();
        assert!(!json.contains("tenant_roles"));
        assert!(!json.contains("tenant_permissions"));
        assert!(!json.contains("license"));
    }

    #[test]
    fn test_access_claims_tolerates_missing_collections() {
        // Claims minted before the permission model existed
        let json = r#"{
            "sub": "usr_1",
            "email": "a@b.example",
            "iss": "https://auth.example",
            "aud": ["web"],
            "iat": 1700000000,
            "exp": 1700003600
        }"#;

        let claims: AccessClaims = serde_json::from_str(json).unwrap();
        assert!(claims.tenant_roles.is_empty());
        assert!(claims.tenant_permissions.is_empty());
        assert!(claims.app_roles.is_empty());
        assert!(claims.license.is_none());
    }

    #[test]
    fn test_license_type_field_renames() {
        let license = LicenseClaims {
            license_type: "pro".to_string(),
            name: "Pro Monthly".to_string(),
            features: vec![],
        };

        let json = serde_json::to_string(&license).unwrap();
        assert!(json.contains(r#""type":"pro""#));
        assert!(!json.contains("license_type"));
    }

    #[test]
    fn test_refresh_claims_discriminator() {
        let claims = RefreshClaims {
            sub: "usr_1".to_string(),
            iss: "https://auth.example".to_string(),
            aud: vec!["web".to_string()],
            iat: 1_700_000_000,
            exp: 1_702_592_000,
            sid: Uuid::new_v4(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            tenant_id: None,
        };

        assert!(claims.is_refresh());

        let mut forged = claims.clone();
        forged.token_type = "access".to_string();
        assert!(!forged.is_refresh());
    }

    #[test]
    fn test_refresh_claims_debug_redacts_sub() {
        let claims = RefreshClaims {
            sub: "usr_secret".to_string(),
            iss: "https://auth.example".to_string(),
            aud: vec![],
            iat: 0,
            exp: 0,
            sid: Uuid::new_v4(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            tenant_id: None,
        };

        let debug_str = format!("{claims:?}");
        assert!(!debug_str.contains("usr_secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_identity_claims_debug_redacts_profile() {
        let claims = IdentityClaims {
            sub: "usr_9".to_string(),
            iss: "https://auth.example".to_string(),
            aud: vec!["web".to_string()],
            iat: 0,
            exp: 0,
            email: "carol@example.com".to_string(),
            name: Some("Carol".to_string()),
        };

        let debug_str = format!("{claims:?}");
        assert!(!debug_str.contains("usr_9\""));
        assert!(!debug_str.contains("carol@example.com"));
    }

    // -------------------------------------------------------------------------
    // Key Decoding Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_ed25519_public_key_pem() {
        let pem = "-----BEGIN PUBLIC KEY-----\ndGVzdA==\n-----END PUBLIC KEY-----";
        let result = decode_ed25519_public_key_pem(pem);
        assert_eq!(result.unwrap(), b"test");
    }

    #[test]
    fn test_decode_ed25519_public_key_pem_invalid_base64() {
        let pem = "-----BEGIN PUBLIC KEY-----\n!!!invalid!!!\n-----END PUBLIC KEY-----";
        assert!(decode_ed25519_public_key_pem(pem).is_err());
    }

    #[test]
    fn test_decode_ed25519_public_key_jwk() {
        let x = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";
        let result = decode_ed25519_public_key_jwk(x);
        assert_eq!(result.unwrap().len(), 32); // Ed25519 public key is 32 bytes
    }

    #[test]
    fn test_decode_ed25519_public_key_jwk_invalid() {
        assert!(decode_ed25519_public_key_jwk("not-valid-base64url!!!").is_err());
    }
}
