use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on the authorization-code lifetime (seconds).
///
/// Codes are single-use bearer artifacts crossing the browser; their window
/// must stay short even under misconfiguration.
pub const MAX_AUTH_CODE_TTL_SECS: u64 = 60;

/// A client registered with this provider.
///
/// The authorize and token endpoints accept only `(client_id, redirect_uri)`
/// pairs present in this table.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Issuer URL, used as the `iss` claim and in the discovery document.
    pub issuer: String,
    pub bind_address: String,
    /// Audience stamped into tokens when the client requests none.
    pub default_audience: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub identity_token_ttl: Duration,
    pub auth_code_ttl: Duration,
    pub key_rotation_interval: Duration,
    pub key_grace_period: Duration,
    pub clients: Vec<RegisteredClient>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid client registry: {0}")]
    InvalidClients(String),
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or malformed.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = vars
            .get("IDP_ISSUER")
            .ok_or_else(|| ConfigError::MissingEnvVar("IDP_ISSUER".to_string()))?
            .trim_end_matches('/')
            .to_string();

        if !issuer.starts_with("http://") && !issuer.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "IDP_ISSUER".to_string(),
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let clients_json = vars
            .get("IDP_CLIENTS")
            .ok_or_else(|| ConfigError::MissingEnvVar("IDP_CLIENTS".to_string()))?;

        let clients: Vec<RegisteredClient> = serde_json::from_str(clients_json)
            .map_err(|e| ConfigError::InvalidClients(e.to_string()))?;

        if clients.is_empty() {
            return Err(ConfigError::InvalidClients(
                "at least one client must be registered".to_string(),
            ));
        }

        let default_audience = vars
            .get("IDP_DEFAULT_AUDIENCE")
            .cloned()
            .or_else(|| clients.first().map(|c| c.client_id.clone()))
            .ok_or_else(|| ConfigError::MissingEnvVar("IDP_DEFAULT_AUDIENCE".to_string()))?;

        let access_token_ttl = duration_var(vars, "IDP_ACCESS_TOKEN_TTL_SECS", 3600)?;
        let refresh_token_ttl = duration_var(vars, "IDP_REFRESH_TOKEN_TTL_SECS", 30 * 86400)?;
        let identity_token_ttl = duration_var(vars, "IDP_IDENTITY_TOKEN_TTL_SECS", 3600)?;
        let auth_code_ttl = duration_var(vars, "IDP_AUTH_CODE_TTL_SECS", 60)?;
        let key_rotation_interval = duration_var(vars, "IDP_KEY_ROTATION_INTERVAL_SECS", 30 * 86400)?;
        let key_grace_period = duration_var(vars, "IDP_KEY_GRACE_PERIOD_SECS", 7 * 86400)?;

        if auth_code_ttl.as_secs() == 0 || auth_code_ttl.as_secs() > MAX_AUTH_CODE_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "IDP_AUTH_CODE_TTL_SECS".to_string(),
                reason: format!("must be between 1 and {MAX_AUTH_CODE_TTL_SECS} seconds"),
            });
        }

        Ok(Config {
            issuer,
            bind_address,
            default_audience,
            access_token_ttl,
            refresh_token_ttl,
            identity_token_ttl,
            auth_code_ttl,
            key_rotation_interval,
            key_grace_period,
            clients,
        })
    }

    /// Look up a registered client by id.
    #[must_use]
    pub fn client(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.iter().find(|c| c.client_id == client_id)
    }

    /// True if `redirect_uri` is registered for `client_id` (exact match).
    #[must_use]
    pub fn is_registered_redirect(&self, client_id: &str, redirect_uri: &str) -> bool {
        self.client(client_id)
            .is_some_and(|c| c.redirect_uris.iter().any(|uri| uri == redirect_uri))
    }
}

fn duration_var(
    vars: &HashMap<String, String>,
    key: &str,
    default_secs: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(key) {
        None => Ok(Duration::from_secs(default_secs)),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
