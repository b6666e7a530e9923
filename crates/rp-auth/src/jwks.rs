//! JWKS client for fetching and caching the provider's public keys.
//!
//! Keys are fetched from the identity provider's `/.well-known/jwks.json`
//! endpoint and cached with a configurable TTL. A lookup for a `kid` that
//! is not in a fresh cache forces one refresh before failing, so tokens
//! signed right after a key rotation validate without waiting for the TTL
//! to lapse. Concurrent refreshes are collapsed to a single fetch.

use crate::errors::ValidationFailure;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (1 hour).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// HTTP timeout for JWKS fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("OKP" for Ed25519).
    pub kty: String,

    /// Key ID, used to select the key for verification.
    pub kid: String,

    /// Curve name ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key value (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// Algorithm ("EdDSA").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Cached key set with its fetch time.
struct CachedKeys {
    /// Map of key ID to JWK.
    keys: HashMap<String, Jwk>,

    /// When this snapshot was fetched.
    fetched_at: Instant,
}

/// Thread-safe JWKS cache.
pub struct JwksCache {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached key set.
    cache: RwLock<Option<CachedKeys>>,

    /// Serializes refreshes so a burst of misses costs one fetch.
    refresh_guard: Mutex<()>,

    /// Cache TTL duration.
    cache_ttl: Duration,
}

impl JwksCache {
    /// Create a cache with the default TTL.
    #[must_use]
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Create a cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "rp.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            refresh_guard: Mutex::new(()),
            cache_ttl,
        }
    }

    /// Get a JWK by key ID.
    ///
    /// A fresh cache that lacks the `kid` still triggers one forced
    /// refresh before the lookup fails, covering tokens signed with a key
    /// published after the last fetch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationFailure::JwksUnavailable`] if the key set
    /// cannot be fetched, or [`ValidationFailure::UnknownKey`] if the
    /// `kid` is absent after a refresh.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, ValidationFailure> {
        let observed_fetch = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(cached) if cached.fetched_at.elapsed() < self.cache_ttl => {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "rp.auth.jwks", kid = %kid, "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    // Fresh cache, unknown kid: likely a rotation we have
                    // not observed yet
                    tracing::debug!(target: "rp.auth.jwks", kid = %kid, "Key not in fresh cache, forcing refresh");
                    Some(cached.fetched_at)
                }
                Some(cached) => Some(cached.fetched_at),
                None => None,
            }
        };

        self.refresh_newer_than(observed_fetch).await?;

        let cache = self.cache.read().await;
        if let Some(cached) = cache.as_ref() {
            if let Some(key) = cached.keys.get(kid) {
                return Ok(key.clone());
            }
        }

        tracing::warn!(target: "rp.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(ValidationFailure::UnknownKey)
    }

    /// Refresh the cache unless another task already fetched a snapshot
    /// newer than the one the caller observed.
    async fn refresh_newer_than(
        &self,
        observed_fetch: Option<Instant>,
    ) -> Result<(), ValidationFailure> {
        let _guard = self.refresh_guard.lock().await;

        // Another task may have refreshed while we waited for the guard
        {
            let cache = self.cache.read().await;
            if let (Some(cached), Some(observed)) = (cache.as_ref(), observed_fetch) {
                if cached.fetched_at > observed {
                    tracing::debug!(target: "rp.auth.jwks", "Skipping refresh, cache already updated");
                    return Ok(());
                }
            } else if cache.is_some() && observed_fetch.is_none() {
                return Ok(());
            }
        }

        self.fetch_and_store().await
    }

    /// Fetch the JWKS document and replace the cached snapshot.
    #[instrument(skip(self))]
    async fn fetch_and_store(&self) -> Result<(), ValidationFailure> {
        tracing::debug!(target: "rp.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "rp.auth.jwks", error = %e, "Failed to fetch JWKS");
                ValidationFailure::JwksUnavailable("fetch failed".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "rp.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(ValidationFailure::JwksUnavailable(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let document: JwksDocument = response.json().await.map_err(|e| {
            tracing::error!(target: "rp.auth.jwks", error = %e, "Failed to parse JWKS response");
            ValidationFailure::JwksUnavailable("invalid document".to_string())
        })?;

        let keys: HashMap<String, Jwk> = document
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "rp.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    /// Force a refresh regardless of cache state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationFailure::JwksUnavailable`] if the fetch fails.
    pub async fn force_refresh(&self) -> Result<(), ValidationFailure> {
        let _guard = self.refresh_guard.lock().await;
        self.fetch_and_store().await
    }

    #[cfg(test)]
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}
