//! Metrics definitions for the identity provider.
//!
//! All metrics follow Prometheus naming conventions:
//! - `idp_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `grant_type`: 2 values (authorization_code, refresh_token)
//! - `status`: 2 values (success, error)
//! - `outcome`: bounded by the code-exchange rejection reasons (~6 values)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `idp_token_issuance_duration_seconds`, `idp_token_issuance_total`
/// Labels: `grant_type`, `status`
pub fn record_token_issuance(grant_type: &str, status: &str, duration: Duration) {
    histogram!("idp_token_issuance_duration_seconds", "grant_type" => grant_type.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("idp_token_issuance_total", "grant_type" => grant_type.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record an authorization-code exchange outcome
///
/// Metric: `idp_code_exchanges_total`
/// Labels: `outcome` (success, unknown_code, consumed, expired,
///         client_mismatch, pkce_failed)
pub fn record_code_exchange(outcome: &str) {
    counter!("idp_code_exchanges_total", "outcome" => outcome.to_string()).increment(1);
}

// ============================================================================
// Key Management Metrics
// ============================================================================

/// Record a key rotation event
///
/// Metric: `idp_key_rotation_total`
/// Labels: `status`
pub fn record_key_rotation(status: &str) {
    counter!("idp_key_rotation_total", "status" => status.to_string()).increment(1);
}

/// Update the published verification key count
///
/// Metric: `idp_verification_keys`
pub fn set_verification_keys(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("idp_verification_keys").set(count as f64);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS endpoint request
///
/// Metric: `idp_jwks_requests_total`
pub fn record_jwks_request() {
    counter!("idp_jwks_requests_total").increment(1);
}

// ============================================================================
// Authorization Flow Metrics
// ============================================================================

/// Record an authorize request outcome
///
/// Metric: `idp_authorize_requests_total`
/// Labels: `status` (success, error)
pub fn record_authorize_request(status: &str) {
    counter!("idp_authorize_requests_total", "status" => status.to_string()).increment(1);
}

/// Record a session revocation
///
/// Metric: `idp_sessions_revoked_total`
pub fn record_session_revoked() {
    counter!("idp_sessions_revoked_total").increment(1);
}
