//! Token issuance.
//!
//! Pure minting: given an already-authenticated subject and its resolved
//! tenant context, produce signed access, refresh, and identity tokens.
//! Authorization decisions belong to the flow controller and to relying
//! parties, never here.

use crate::errors::IdpError;
use crate::keystore::KeyStore;
use crate::models::AuthenticatedUser;
use crate::{config::Config, crypto};
use chrono::Utc;
use common::jwt::{AccessClaims, IdentityClaims, RefreshClaims, REFRESH_TOKEN_TYPE};
use common::secret::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

pub struct TokenIssuer {
    keystore: Arc<KeyStore>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    identity_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(keystore: Arc<KeyStore>, config: &Config) -> Self {
        Self {
            keystore,
            issuer: config.issuer.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            identity_ttl: config.identity_token_ttl,
        }
    }

    /// Access token lifetime, for `expires_in` in token responses.
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime; sessions outlive their refresh tokens by
    /// nothing, so this also bounds session retention.
    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token carrying the subject's tenant context and
    /// permission grants as they stood at issuance.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::KeyStore` if no active key exists, or
    /// `IdpError::Crypto` if signing fails.
    #[instrument(skip_all)]
    pub async fn issue_access_token(
        &self,
        user: &AuthenticatedUser,
        audience: &str,
    ) -> Result<String, IdpError> {
        let now = Utc::now().timestamp();

        let claims = AccessClaims {
            sub: user.subject.clone(),
            email: user.email.clone(),
            iss: self.issuer.clone(),
            aud: vec![audience.to_string()],
            iat: now,
            exp: now + ttl_secs(self.access_ttl),
            nbf: None,
            tenant_id: user.tenant.as_ref().map(|t| t.tenant_id.clone()),
            tenant_subdomain: user.tenant.as_ref().map(|t| t.subdomain.clone()),
            tenant_roles: user
                .tenant
                .as_ref()
                .map(|t| t.roles.clone())
                .unwrap_or_default(),
            tenant_permissions: user
                .tenant
                .as_ref()
                .map(|t| t.permissions.clone())
                .unwrap_or_default(),
            app_roles: user.app_roles.clone(),
            license: user.license.clone(),
        };

        let active = self.keystore.active_key().await?;
        crypto::sign_jwt(&claims, active.private_key_pkcs8.expose_secret(), &active.kid)
    }

    /// Mint a refresh token bound to session `sid`.
    ///
    /// Refresh tokens carry no permission data; grants are re-resolved when
    /// the token is exchanged.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::KeyStore` if no active key exists, or
    /// `IdpError::Crypto` if signing fails.
    #[instrument(skip_all)]
    pub async fn issue_refresh_token(
        &self,
        user: &AuthenticatedUser,
        audience: &str,
        sid: Uuid,
    ) -> Result<String, IdpError> {
        let now = Utc::now().timestamp();

        let claims = RefreshClaims {
            sub: user.subject.clone(),
            iss: self.issuer.clone(),
            aud: vec![audience.to_string()],
            iat: now,
            exp: now + ttl_secs(self.refresh_ttl),
            sid,
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            tenant_id: user.tenant.as_ref().map(|t| t.tenant_id.clone()),
        };

        let active = self.keystore.active_key().await?;
        crypto::sign_jwt(&claims, active.private_key_pkcs8.expose_secret(), &active.kid)
    }

    /// Mint an OIDC identity token (profile claims only).
    ///
    /// # Errors
    ///
    /// Returns `IdpError::KeyStore` if no active key exists, or
    /// `IdpError::Crypto` if signing fails.
    #[instrument(skip_all)]
    pub async fn issue_identity_token(
        &self,
        user: &AuthenticatedUser,
        audience: &str,
    ) -> Result<String, IdpError> {
        let now = Utc::now().timestamp();

        let claims = IdentityClaims {
            sub: user.subject.clone(),
            iss: self.issuer.clone(),
            aud: vec![audience.to_string()],
            iat: now,
            exp: now + ttl_secs(self.identity_ttl),
            email: user.email.clone(),
            name: user.name.clone(),
        };

        let active = self.keystore.active_key().await?;
        crypto::sign_jwt(&claims, active.private_key_pkcs8.expose_secret(), &active.kid)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}
