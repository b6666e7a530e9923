//! Boundary to the external login subsystem.
//!
//! Credential verification (passwords, MFA, SSO) is not this service's job.
//! A fronting login gateway authenticates the browser session and forwards
//! the resolved principal; the authorize endpoint consumes it through the
//! [`LoginProvider`] trait. Tests substitute a fixed provider.

use crate::models::AuthenticatedUser;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine};

/// Header carrying the authenticated principal from the login gateway.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

/// Resolves the authenticated principal for an authorize request.
pub trait LoginProvider: Send + Sync {
    /// Returns the principal for this request, or `None` if the request is
    /// not authenticated.
    fn resolve(&self, headers: &HeaderMap) -> Option<AuthenticatedUser>;
}

/// Production provider: trusts the principal forwarded by the login gateway
/// as base64-encoded JSON in [`AUTHENTICATED_USER_HEADER`].
///
/// The gateway strips this header from any external request before it
/// reaches the provider; only the gateway itself may set it.
pub struct GatewayLoginProvider;

impl LoginProvider for GatewayLoginProvider {
    fn resolve(&self, headers: &HeaderMap) -> Option<AuthenticatedUser> {
        let raw = headers.get(AUTHENTICATED_USER_HEADER)?.to_str().ok()?;
        let bytes = STANDARD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Test provider that always resolves the same principal.
pub struct FixedLoginProvider {
    user: AuthenticatedUser,
}

impl FixedLoginProvider {
    #[must_use]
    pub fn new(user: AuthenticatedUser) -> Self {
        Self { user }
    }
}

impl LoginProvider for FixedLoginProvider {
    fn resolve(&self, _headers: &HeaderMap) -> Option<AuthenticatedUser> {
        Some(self.user.clone())
    }
}
