//! Authorization-code issuance and exchange, refresh grant, and sessions.
//!
//! The code table is the only server-side state a login leaves behind before
//! token issuance. Every check on a code (present, unconsumed, unexpired,
//! client match, PKCE proof) and the consume itself happen under one lock
//! acquisition, so exchanges on the same code are linearizable: of N
//! concurrent attempts, exactly one wins.

use crate::config::Config;
use crate::crypto;
use crate::errors::IdpError;
use crate::keystore::KeyStore;
use crate::models::{AuthenticatedUser, AuthorizeParams, PkceMethod, TokenResponse};
use crate::observability::metrics::{
    record_authorize_request, record_code_exchange, record_session_revoked,
    record_token_issuance,
};
use crate::services::token_issuer::TokenIssuer;
use chrono::{DateTime, Utc};
use common::jwt::RefreshClaims;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

/// Entropy of an authorization code (256 bits).
const AUTH_CODE_BYTES: usize = 32;

const GENERIC_CODE_ERROR: &str = "The authorization code is invalid or expired";
const GENERIC_REFRESH_ERROR: &str = "The refresh token is invalid or expired";

/// A pending authorization code and everything needed to redeem it.
struct AuthorizationCode {
    client_id: String,
    redirect_uri: String,
    code_challenge: String,
    code_challenge_method: PkceMethod,
    user: AuthenticatedUser,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

/// A login session; the unit of refresh-token revocation.
///
/// A session is useless once every refresh token bound to it has expired,
/// so `expires_at` mirrors the refresh TTL and the sweep evicts on it.
struct SessionRecord {
    user: AuthenticatedUser,
    revoked: bool,
    expires_at: DateTime<Utc>,
}

/// The authorization flow controller.
pub struct AuthorizationFlow {
    config: Arc<Config>,
    keystore: Arc<KeyStore>,
    token_issuer: Arc<TokenIssuer>,
    codes: Mutex<HashMap<String, AuthorizationCode>>,
    sessions: Mutex<HashMap<Uuid, SessionRecord>>,
}

impl AuthorizationFlow {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        keystore: Arc<KeyStore>,
        token_issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            config,
            keystore,
            token_issuer,
            codes: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Validate an authorize request for an authenticated principal and
    /// issue a single-use authorization code.
    ///
    /// # Errors
    ///
    /// - `IdpError::InvalidRequest` for a non-`code` response type, a
    ///   missing challenge, or an unknown challenge method
    /// - `IdpError::InvalidClient` for an unknown client or an unregistered
    ///   redirect URI
    #[instrument(skip_all, fields(client_id = %params.client_id))]
    pub async fn start_authorization(
        &self,
        params: &AuthorizeParams,
        user: AuthenticatedUser,
    ) -> Result<String, IdpError> {
        if params.response_type != "code" {
            record_authorize_request("error");
            return Err(IdpError::InvalidRequest(format!(
                "Unsupported response_type: {}",
                params.response_type
            )));
        }

        if !self
            .config
            .is_registered_redirect(&params.client_id, &params.redirect_uri)
        {
            record_authorize_request("error");
            return Err(IdpError::InvalidClient);
        }

        if params.code_challenge.is_empty() {
            record_authorize_request("error");
            return Err(IdpError::InvalidRequest(
                "code_challenge is required".to_string(),
            ));
        }

        let method = PkceMethod::from_str(&params.code_challenge_method)
            .map_err(IdpError::InvalidRequest)?;

        let code = crypto::generate_url_safe_token(AUTH_CODE_BYTES)?;
        let ttl = i64::try_from(self.config.auth_code_ttl.as_millis()).unwrap_or(60_000);
        let expires_at = Utc::now() + chrono::Duration::milliseconds(ttl);

        let mut codes = self.codes.lock().await;
        codes.insert(
            code.clone(),
            AuthorizationCode {
                client_id: params.client_id.clone(),
                redirect_uri: params.redirect_uri.clone(),
                code_challenge: params.code_challenge.clone(),
                code_challenge_method: method,
                user,
                expires_at,
                consumed: false,
            },
        );
        drop(codes);

        record_authorize_request("success");
        tracing::debug!(
            target: "idp.oauth",
            client_id = %params.client_id,
            "Authorization code issued"
        );

        Ok(code)
    }

    /// Redeem an authorization code for tokens.
    ///
    /// All rejection checks and the consume run in one critical section;
    /// the code is marked consumed only when every check, including the
    /// PKCE proof, has passed.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::InvalidGrant` with a generic description for any
    /// rejected code; the precise reason goes to metrics and debug logs.
    #[instrument(skip_all, fields(client_id = %client_id))]
    pub async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, IdpError> {
        let start = Instant::now();

        let user = {
            let mut codes = self.codes.lock().await;

            let entry = codes.get_mut(code).ok_or_else(|| {
                record_code_exchange("unknown_code");
                IdpError::InvalidGrant(GENERIC_CODE_ERROR.to_string())
            })?;

            if entry.consumed {
                record_code_exchange("consumed");
                tracing::warn!(
                    target: "idp.oauth",
                    client_id = %client_id,
                    "Replay of consumed authorization code"
                );
                return Err(IdpError::InvalidGrant(GENERIC_CODE_ERROR.to_string()));
            }

            if entry.expires_at <= Utc::now() {
                record_code_exchange("expired");
                return Err(IdpError::InvalidGrant(GENERIC_CODE_ERROR.to_string()));
            }

            if entry.client_id != client_id || entry.redirect_uri != redirect_uri {
                record_code_exchange("client_mismatch");
                return Err(IdpError::InvalidGrant(
                    "Client verification failed".to_string(),
                ));
            }

            let proof_ok = match entry.code_challenge_method {
                PkceMethod::S256 => crypto::challenges_match(
                    &crypto::pkce_s256_challenge(code_verifier),
                    &entry.code_challenge,
                ),
                PkceMethod::Plain => {
                    crypto::challenges_match(code_verifier, &entry.code_challenge)
                }
            };

            if !proof_ok {
                record_code_exchange("pkce_failed");
                return Err(IdpError::InvalidGrant(
                    "PKCE verification failed".to_string(),
                ));
            }

            entry.consumed = true;
            entry.user.clone()
        };

        record_code_exchange("success");

        let sid = Uuid::new_v4();
        let session_ttl =
            i64::try_from(self.token_issuer.refresh_ttl().as_secs()).unwrap_or(30 * 86400);
        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                sid,
                SessionRecord {
                    user: user.clone(),
                    revoked: false,
                    expires_at: Utc::now() + chrono::Duration::seconds(session_ttl),
                },
            );
        }

        let audience = self.config.default_audience.clone();
        let result = self.mint_bundle(&user, &audience, sid).await;

        match &result {
            Ok(_) => record_token_issuance("authorization_code", "success", start.elapsed()),
            Err(_) => record_token_issuance("authorization_code", "error", start.elapsed()),
        }

        result
    }

    async fn mint_bundle(
        &self,
        user: &AuthenticatedUser,
        audience: &str,
        sid: Uuid,
    ) -> Result<TokenResponse, IdpError> {
        let access_token = self.token_issuer.issue_access_token(user, audience).await?;
        let refresh_token = self
            .token_issuer
            .issue_refresh_token(user, audience, sid)
            .await?;
        let id_token = self
            .token_issuer
            .issue_identity_token(user, audience)
            .await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_issuer.access_ttl().as_secs(),
            refresh_token: Some(refresh_token),
            id_token: Some(id_token),
        })
    }

    /// Redeem a refresh token for a fresh access token.
    ///
    /// The token is verified against the provider's own published keys, the
    /// `token_type` discriminator and issuer are checked, and the session
    /// must still be alive.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::InvalidGrant` with a generic description for any
    /// rejected token.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, IdpError> {
        let start = Instant::now();
        let result = self.refresh_inner(refresh_token).await;

        match &result {
            Ok(_) => record_token_issuance("refresh_token", "success", start.elapsed()),
            Err(_) => record_token_issuance("refresh_token", "error", start.elapsed()),
        }

        result
    }

    async fn refresh_inner(&self, refresh_token: &str) -> Result<TokenResponse, IdpError> {
        let kid = common::jwt::extract_kid(refresh_token)
            .map_err(|_| IdpError::InvalidGrant(GENERIC_REFRESH_ERROR.to_string()))?;

        let key = self
            .keystore
            .verification_key(&kid)
            .await
            .ok_or_else(|| IdpError::InvalidGrant(GENERIC_REFRESH_ERROR.to_string()))?;

        let claims: RefreshClaims = crypto::verify_jwt(refresh_token, &key.public_key_pem)
            .map_err(|_| IdpError::InvalidGrant(GENERIC_REFRESH_ERROR.to_string()))?;

        if !claims.is_refresh() || claims.iss != self.config.issuer {
            return Err(IdpError::InvalidGrant(GENERIC_REFRESH_ERROR.to_string()));
        }

        let user = {
            let sessions = self.sessions.lock().await;
            let session = sessions
                .get(&claims.sid)
                .filter(|s| !s.revoked)
                .ok_or_else(|| {
                    IdpError::InvalidGrant("The session has been revoked".to_string())
                })?;
            session.user.clone()
        };

        let audience = claims
            .aud
            .first()
            .cloned()
            .unwrap_or_else(|| self.config.default_audience.clone());

        let access_token = self
            .token_issuer
            .issue_access_token(&user, &audience)
            .await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_issuer.access_ttl().as_secs(),
            refresh_token: None,
            id_token: None,
        })
    }

    /// Revoke a session. Refresh tokens bound to it stop working
    /// immediately. Returns false if the session is unknown.
    pub async fn revoke_session(&self, sid: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&sid) {
            Some(session) => {
                session.revoked = true;
                record_session_revoked();
                true
            }
            None => false,
        }
    }

    /// Evict consumed and expired codes. Expiry is enforced on lookup
    /// regardless; this only bounds the table's memory.
    pub async fn sweep_codes(&self) -> usize {
        let now = Utc::now();
        let mut codes = self.codes.lock().await;
        let before = codes.len();
        codes.retain(|_, entry| !entry.consumed && entry.expires_at > now);
        before - codes.len()
    }

    /// Evict revoked sessions and sessions whose refresh tokens can no
    /// longer be live. A missing session denies refresh the same way a
    /// revoked one does, so eviction never weakens revocation.
    pub async fn sweep_sessions(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.revoked && session.expires_at > now);
        before - sessions.len()
    }

    #[cfg(test)]
    async fn set_code_expiry(&self, code: &str, expires_at: DateTime<Utc>) {
        let mut codes = self.codes.lock().await;
        if let Some(entry) = codes.get_mut(code) {
            entry.expires_at = expires_at;
        }
    }

    #[cfg(test)]
    async fn force_expire(&self, code: &str) {
        self.set_code_expiry(code, Utc::now() - chrono::Duration::milliseconds(1))
            .await;
    }

    #[cfg(test)]
    async fn force_expire_session(&self, sid: Uuid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&sid) {
            session.expires_at = Utc::now() - chrono::Duration::milliseconds(1);
        }
    }

    #[cfg(test)]
    async fn code_table_len(&self) -> usize {
        self.codes.lock().await.len()
    }

    #[cfg(test)]
    async fn session_table_len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Spawn the periodic code and session sweep.
pub fn spawn_sweep_task(
    flow: Arc<AuthorizationFlow>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let codes = flow.sweep_codes().await;
            let sessions = flow.sweep_sessions().await;
            if codes > 0 || sessions > 0 {
                tracing::debug!(
                    target: "idp.oauth",
                    codes = codes,
                    sessions = sessions,
                    "Swept code and session tables"
                );
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::TenantContext;
    use common::jwt::AccessClaims;
    use std::collections::HashMap as StdHashMap;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    fn test_config() -> Arc<Config> {
        let vars = StdHashMap::from([
            (
                "IDP_ISSUER".to_string(),
                "https://auth.example.com".to_string(),
            ),
            (
                "IDP_CLIENTS".to_string(),
                r#"[{"client_id":"web-app","redirect_uris":["https://app.example.com/cb"]}]"#
                    .to_string(),
            ),
        ]);
        Arc::new(Config::from_vars(&vars).unwrap())
    }

    fn test_user() -> AuthenticatedUser {
        AuthenticatedUser {
            subject: "usr_55".to_string(),
            email: "gale@initech.example".to_string(),
            name: None,
            tenant: Some(TenantContext {
                tenant_id: "tnt_9".to_string(),
                subdomain: "initech".to_string(),
                roles: vec!["member".to_string()],
                permissions: vec!["projects:read".to_string()],
            }),
            app_roles: vec![],
            license: None,
        }
    }

    fn authorize_params(challenge: &str, method: &str) -> AuthorizeParams {
        AuthorizeParams {
            response_type: "code".to_string(),
            client_id: "web-app".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            code_challenge: challenge.to_string(),
            code_challenge_method: method.to_string(),
            scope: None,
            state: None,
        }
    }

    async fn test_flow() -> (Arc<AuthorizationFlow>, Arc<KeyStore>) {
        let config = test_config();
        let store = KeyStore::bootstrap(std::time::Duration::from_secs(7 * 86400))
            .await
            .unwrap();
        let issuer = Arc::new(TokenIssuer::new(Arc::clone(&store), &config));
        let flow = Arc::new(AuthorizationFlow::new(config, Arc::clone(&store), issuer));
        (flow, store)
    }

    async fn start_s256(flow: &AuthorizationFlow) -> String {
        let challenge = crypto::pkce_s256_challenge(VERIFIER);
        flow.start_authorization(&authorize_params(&challenge, "S256"), test_user())
            .await
            .unwrap()
    }

    // -------------------------------------------------------------------------
    // start_authorization
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_rejects_unknown_client() {
        let (flow, _) = test_flow().await;
        let mut params = authorize_params("challenge", "S256");
        params.client_id = "unknown-app".to_string();

        let result = flow.start_authorization(&params, test_user()).await;
        assert!(matches!(result, Err(IdpError::InvalidClient)));
    }

    #[tokio::test]
    async fn test_start_rejects_unregistered_redirect() {
        let (flow, _) = test_flow().await;
        let mut params = authorize_params("challenge", "S256");
        params.redirect_uri = "https://evil.example.com/cb".to_string();

        let result = flow.start_authorization(&params, test_user()).await;
        assert!(matches!(result, Err(IdpError::InvalidClient)));
    }

    #[tokio::test]
    async fn test_start_rejects_non_code_response_type() {
        let (flow, _) = test_flow().await;
        let mut params = authorize_params("challenge", "S256");
        params.response_type = "token".to_string();

        let result = flow.start_authorization(&params, test_user()).await;
        assert!(matches!(result, Err(IdpError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_empty_challenge() {
        let (flow, _) = test_flow().await;
        let params = authorize_params("", "S256");

        let result = flow.start_authorization(&params, test_user()).await;
        assert!(matches!(result, Err(IdpError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_method() {
        let (flow, _) = test_flow().await;
        let params = authorize_params("challenge", "SHA512");

        let result = flow.start_authorization(&params, test_user()).await;
        assert!(matches!(result, Err(IdpError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_issued_codes_are_unique_and_high_entropy() {
        let (flow, _) = test_flow().await;
        let a = start_s256(&flow).await;
        let b = start_s256(&flow).await;

        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // 256 bits base64url
    }

    // -------------------------------------------------------------------------
    // exchange
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_exchange_happy_path_s256() {
        let (flow, store) = test_flow().await;
        let code = start_s256(&flow).await;

        let response = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        assert!(response.refresh_token.is_some());
        assert!(response.id_token.is_some());

        // The access token validates against the published key set
        let kid = common::jwt::extract_kid(&response.access_token).unwrap();
        let key = store.verification_key(&kid).await.unwrap();
        let claims: AccessClaims =
            crypto::verify_jwt(&response.access_token, &key.public_key_pem).unwrap();
        assert_eq!(claims.sub, "usr_55");
        assert_eq!(claims.tenant_permissions, vec!["projects:read".to_string()]);
    }

    #[tokio::test]
    async fn test_exchange_plain_method() {
        let (flow, _) = test_flow().await;
        let code = flow
            .start_authorization(&authorize_params(VERIFIER, "plain"), test_user())
            .await
            .unwrap();

        let result = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_exchange_unknown_code() {
        let (flow, _) = test_flow().await;

        let result = flow
            .exchange(
                "no-such-code",
                VERIFIER,
                "web-app",
                "https://app.example.com/cb",
            )
            .await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_exchange_is_single_use() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;

        flow.exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await
            .unwrap();

        let replay = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await;
        assert!(matches!(replay, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_exchange_exactly_one_winner() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flow = Arc::clone(&flow);
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                flow.exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_exchange_expired_code() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;
        flow.force_expire(&code).await;

        let result = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_exchange_accepts_code_just_inside_expiry() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;

        // Expiry checks are strict: any instant before expires_at redeems
        flow.set_code_expiry(&code, Utc::now() + chrono::Duration::milliseconds(50))
            .await;

        let result = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_exchange_client_mismatch() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;

        let result = flow
            .exchange(&code, VERIFIER, "other-app", "https://app.example.com/cb")
            .await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_exchange_redirect_mismatch() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;

        let result = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/other")
            .await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_exchange_wrong_verifier_does_not_consume() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;

        let failed = flow
            .exchange(
                &code,
                "wrong-verifier",
                "web-app",
                "https://app.example.com/cb",
            )
            .await;
        assert!(matches!(failed, Err(IdpError::InvalidGrant(_))));

        // Consume happens only when every check passes; the rightful holder
        // can still redeem
        let result = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await;
        assert!(result.is_ok());
    }

    // -------------------------------------------------------------------------
    // refresh grant and sessions
    // -------------------------------------------------------------------------

    async fn exchange_for_refresh(flow: &Arc<AuthorizationFlow>) -> String {
        let code = start_s256(flow).await;
        flow.exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await
            .unwrap()
            .refresh_token
            .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_issues_new_access_token() {
        let (flow, store) = test_flow().await;
        let refresh_token = exchange_for_refresh(&flow).await;

        let response = flow.refresh(&refresh_token).await.unwrap();
        assert!(response.refresh_token.is_none());
        assert!(response.id_token.is_none());

        let kid = common::jwt::extract_kid(&response.access_token).unwrap();
        let key = store.verification_key(&kid).await.unwrap();
        let claims: AccessClaims =
            crypto::verify_jwt(&response.access_token, &key.public_key_pem).unwrap();
        assert_eq!(claims.sub, "usr_55");
    }

    #[tokio::test]
    async fn test_refresh_survives_key_rotation_within_grace() {
        let (flow, store) = test_flow().await;
        let refresh_token = exchange_for_refresh(&flow).await;

        store.rotate().await.unwrap();

        // Old key is Retiring; the refresh token still validates and the
        // new access token is signed by the new active key
        let response = flow.refresh(&refresh_token).await.unwrap();
        let kid = common::jwt::extract_kid(&response.access_token).unwrap();
        assert_eq!(kid, store.active_key().await.unwrap().kid);
    }

    #[tokio::test]
    async fn test_refresh_rejected_after_session_revocation() {
        let (flow, store) = test_flow().await;
        let refresh_token = exchange_for_refresh(&flow).await;

        let kid = common::jwt::extract_kid(&refresh_token).unwrap();
        let key = store.verification_key(&kid).await.unwrap();
        let claims: RefreshClaims =
            crypto::verify_jwt(&refresh_token, &key.public_key_pem).unwrap();

        assert!(flow.revoke_session(claims.sid).await);

        let result = flow.refresh(&refresh_token).await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_revoke_unknown_session_is_false() {
        let (flow, _) = test_flow().await;
        assert!(!flow.revoke_session(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let (flow, _) = test_flow().await;
        let code = start_s256(&flow).await;
        let response = flow
            .exchange(&code, VERIFIER, "web-app", "https://app.example.com/cb")
            .await
            .unwrap();

        // An access token lacks the refresh discriminator claims
        let result = flow.refresh(&response.access_token).await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage() {
        let (flow, _) = test_flow().await;
        let result = flow.refresh("not-a-jwt").await;
        assert!(matches!(result, Err(IdpError::InvalidGrant(_))));
    }

    // -------------------------------------------------------------------------
    // sweep
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_sweep_evicts_consumed_and_expired() {
        let (flow, _) = test_flow().await;

        let consumed = start_s256(&flow).await;
        flow.exchange(&consumed, VERIFIER, "web-app", "https://app.example.com/cb")
            .await
            .unwrap();

        let expired = start_s256(&flow).await;
        flow.force_expire(&expired).await;

        let live = start_s256(&flow).await;

        assert_eq!(flow.code_table_len().await, 3);
        assert_eq!(flow.sweep_codes().await, 2);
        assert_eq!(flow.code_table_len().await, 1);

        // The live code still works after the sweep
        let result = flow
            .exchange(&live, VERIFIER, "web-app", "https://app.example.com/cb")
            .await;
        assert!(result.is_ok());
    }

    async fn refresh_sid(store: &KeyStore, refresh_token: &str) -> Uuid {
        let kid = common::jwt::extract_kid(refresh_token).unwrap();
        let key = store.verification_key(&kid).await.unwrap();
        let claims: RefreshClaims = crypto::verify_jwt(refresh_token, &key.public_key_pem).unwrap();
        claims.sid
    }

    #[tokio::test]
    async fn test_sweep_evicts_revoked_and_expired_sessions() {
        let (flow, store) = test_flow().await;

        let revoked = exchange_for_refresh(&flow).await;
        flow.revoke_session(refresh_sid(&store, &revoked).await).await;

        let expired = exchange_for_refresh(&flow).await;
        flow.force_expire_session(refresh_sid(&store, &expired).await)
            .await;

        let live = exchange_for_refresh(&flow).await;

        assert_eq!(flow.session_table_len().await, 3);
        assert_eq!(flow.sweep_sessions().await, 2);
        assert_eq!(flow.session_table_len().await, 1);

        // The surviving session still refreshes; the evicted ones stay dead
        assert!(flow.refresh(&live).await.is_ok());
        assert!(matches!(
            flow.refresh(&revoked).await,
            Err(IdpError::InvalidGrant(_))
        ));
        assert!(matches!(
            flow.refresh(&expired).await,
            Err(IdpError::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn test_live_sessions_survive_sweep() {
        let (flow, _) = test_flow().await;
        let refresh_token = exchange_for_refresh(&flow).await;

        assert_eq!(flow.sweep_sessions().await, 0);
        assert!(flow.refresh(&refresh_token).await.is_ok());
    }
}
