//! In-process signing-key set with a rotation lifecycle.
//!
//! Exactly one key is Active (signs new tokens) at any time. Superseded keys
//! stay Retiring for a grace period so outstanding tokens keep validating,
//! then become Retired and are pruned from published material. All state
//! lives behind a single `RwLock`; rotation swaps the whole picture under
//! one write-lock acquisition, so readers observe either the pre- or
//! post-rotation key set, never a mixture.

use crate::crypto;
use crate::errors::IdpError;
use crate::models::{JsonWebKey, Jwks};
use crate::observability::metrics::{record_key_rotation, set_verification_keys};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use common::secret::SecretBox;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::instrument;

/// Lifecycle status of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Signs all newly issued tokens. Exactly one key holds this status.
    Active,
    /// No longer signs, still published for verification.
    Retiring,
    /// Grace period elapsed; pruned from publication.
    Retired,
}

impl KeyStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Retiring => "retiring",
            KeyStatus::Retired => "retired",
        }
    }
}

/// A signing key record. Private material never leaves this module except
/// through [`ActiveKey`] for signing, and is redacted from Debug output.
pub struct SigningKey {
    pub kid: String,
    pub public_key_pem: String,
    private_key_pkcs8: Arc<SecretBox<Vec<u8>>>,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub retires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("private_key_pkcs8", &"[REDACTED]")
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("retires_at", &self.retires_at)
            .finish()
    }
}

/// Snapshot of the active key handed to the token issuer.
#[derive(Clone)]
pub struct ActiveKey {
    pub kid: String,
    pub private_key_pkcs8: Arc<SecretBox<Vec<u8>>>,
}

impl fmt::Debug for ActiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveKey")
            .field("kid", &self.kid)
            .field("private_key_pkcs8", &"[REDACTED]")
            .finish()
    }
}

/// Public half of a key still valid for verification.
#[derive(Debug, Clone)]
pub struct VerificationKey {
    pub kid: String,
    pub public_key_pem: String,
    pub status: KeyStatus,
}

struct KeySet {
    keys: BTreeMap<String, SigningKey>,
    active_kid: Option<String>,
    /// Highest sequence number ever minted per kid prefix. Sequences never
    /// go backwards, so a pruned kid is never reissued to a new key.
    minted: BTreeMap<String, u64>,
}

fn published_count(set: &KeySet) -> u64 {
    let count = set
        .keys
        .values()
        .filter(|k| matches!(k.status, KeyStatus::Active | KeyStatus::Retiring))
        .count();
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// The signing-key store.
pub struct KeyStore {
    inner: RwLock<KeySet>,
    grace_period: Duration,
}

impl KeyStore {
    /// Create a store and install the initial Active key.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::Crypto` if key generation fails. Callers treat this
    /// as fatal at startup: the service must not come up without an active
    /// signing key.
    pub async fn bootstrap(grace_period: Duration) -> Result<Arc<Self>, IdpError> {
        let store = Arc::new(Self {
            inner: RwLock::new(KeySet {
                keys: BTreeMap::new(),
                active_kid: None,
                minted: BTreeMap::new(),
            }),
            grace_period,
        });

        store.rotate().await?;
        Ok(store)
    }

    /// Generate a new Active key and demote the previous one to Retiring.
    ///
    /// Key generation happens before the write lock is taken; the lock only
    /// covers the state swap.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::Crypto` if keypair generation fails. The existing
    /// key set is untouched in that case.
    #[instrument(skip_all)]
    pub async fn rotate(&self) -> Result<String, IdpError> {
        let now = Utc::now();
        let (public_key_pem, private_key_pkcs8) = match crypto::generate_signing_key() {
            Ok(pair) => pair,
            Err(e) => {
                record_key_rotation("error");
                return Err(e);
            }
        };

        let mut set = self.inner.write().await;

        // Key id format: idp-{YYYY}-{NN}, NN strictly increasing within the
        // year even across pruning
        let prefix = format!("idp-{}-", now.format("%Y"));
        let counter = set.minted.entry(prefix.clone()).or_insert(0);
        *counter += 1;
        let sequence = *counter;
        let kid = format!("{prefix}{sequence:02}");

        if let Some(previous_kid) = set.active_kid.take() {
            if let Some(previous) = set.keys.get_mut(&previous_kid) {
                previous.status = KeyStatus::Retiring;
                previous.retires_at = Some(
                    now + chrono::Duration::seconds(
                        i64::try_from(self.grace_period.as_secs()).unwrap_or(7 * 86400),
                    ),
                );
            }
        }

        set.keys.insert(
            kid.clone(),
            SigningKey {
                kid: kid.clone(),
                public_key_pem,
                private_key_pkcs8: Arc::new(SecretBox::new(Box::new(private_key_pkcs8))),
                status: KeyStatus::Active,
                created_at: now,
                retires_at: None,
            },
        );
        set.active_kid = Some(kid.clone());

        let published = published_count(&set);
        drop(set);

        set_verification_keys(published);
        record_key_rotation("success");
        tracing::info!(target: "idp.keystore", kid = %kid, "Signing key rotated");

        Ok(kid)
    }

    /// Snapshot of the current Active key for signing.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::KeyStore` if no active key exists. This is only
    /// possible before bootstrap completes.
    pub async fn active_key(&self) -> Result<ActiveKey, IdpError> {
        let set = self.inner.read().await;
        let kid = set
            .active_kid
            .as_ref()
            .ok_or_else(|| IdpError::KeyStore("No active signing key".to_string()))?;

        let key = set
            .keys
            .get(kid)
            .ok_or_else(|| IdpError::KeyStore("Active key record missing".to_string()))?;

        Ok(ActiveKey {
            kid: key.kid.clone(),
            private_key_pkcs8: Arc::clone(&key.private_key_pkcs8),
        })
    }

    /// All keys currently valid for verification (Active and Retiring).
    pub async fn verification_keys(&self) -> Vec<VerificationKey> {
        let set = self.inner.read().await;
        set.keys
            .values()
            .filter(|k| matches!(k.status, KeyStatus::Active | KeyStatus::Retiring))
            .map(|k| VerificationKey {
                kid: k.kid.clone(),
                public_key_pem: k.public_key_pem.clone(),
                status: k.status,
            })
            .collect()
    }

    /// Look up a single verification key by kid.
    pub async fn verification_key(&self, kid: &str) -> Option<VerificationKey> {
        let set = self.inner.read().await;
        set.keys
            .get(kid)
            .filter(|k| matches!(k.status, KeyStatus::Active | KeyStatus::Retiring))
            .map(|k| VerificationKey {
                kid: k.kid.clone(),
                public_key_pem: k.public_key_pem.clone(),
                status: k.status,
            })
    }

    /// Transition Retiring keys whose grace period has elapsed to Retired
    /// and prune them. Returns the pruned kids.
    pub async fn expire_retiring(&self) -> Vec<String> {
        self.expire_retiring_at(Utc::now()).await
    }

    /// Deterministic variant of [`expire_retiring`] for tests.
    pub async fn expire_retiring_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut set = self.inner.write().await;

        let expired: Vec<String> = set
            .keys
            .values()
            .filter(|k| {
                k.status == KeyStatus::Retiring
                    && k.retires_at.is_some_and(|retires_at| retires_at <= now)
            })
            .map(|k| k.kid.clone())
            .collect();

        for kid in &expired {
            if let Some(key) = set.keys.get_mut(kid) {
                key.status = KeyStatus::Retired;
            }
            set.keys.remove(kid);
            tracing::info!(target: "idp.keystore", kid = %kid, "Retired signing key pruned");
        }

        if !expired.is_empty() {
            set_verification_keys(published_count(&set));
        }

        expired
    }

    /// Project the verification keys into an RFC 7517 JWKS.
    ///
    /// Only public material appears here; there is no code path from private
    /// key bytes into this structure.
    pub async fn to_jwks(&self) -> Jwks {
        let keys = self.verification_keys().await;

        let json_web_keys: Vec<JsonWebKey> = keys
            .into_iter()
            .filter_map(|key| {
                // RFC 7517 OKP: `x` is the raw 32-byte key, base64url
                // without padding. The PEM body is standard base64, so the
                // bytes are re-encoded rather than copied through.
                let raw = match common::jwt::decode_ed25519_public_key_pem(&key.public_key_pem) {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::error!(
                            target: "idp.keystore",
                            kid = %key.kid,
                            error = %e,
                            "Key with undecodable public material excluded from JWKS"
                        );
                        return None;
                    }
                };

                Some(JsonWebKey {
                    kid: key.kid,
                    kty: "OKP".to_string(),
                    crv: "Ed25519".to_string(),
                    x: URL_SAFE_NO_PAD.encode(raw),
                    use_: "sig".to_string(),
                    alg: "EdDSA".to_string(),
                })
            })
            .collect();

        Jwks {
            keys: json_web_keys,
        }
    }
}

/// Spawn the background rotation loop.
///
/// Each tick prunes expired Retiring keys and rotates. Failures are logged
/// and retried on the next tick; the previous Active key keeps signing in
/// the meantime, so request paths never observe a rotation failure.
pub fn spawn_rotation_task(
    store: Arc<KeyStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; bootstrap already installed a key
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let pruned = store.expire_retiring().await;
            if !pruned.is_empty() {
                tracing::info!(
                    target: "idp.keystore",
                    count = pruned.len(),
                    "Pruned retired signing keys"
                );
            }

            if let Err(e) = store.rotate().await {
                tracing::warn!(
                    target: "idp.keystore",
                    error = %e,
                    "Scheduled key rotation failed, will retry next interval"
                );
            }
        }
    })
}
