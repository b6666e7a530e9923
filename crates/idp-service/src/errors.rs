use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Service-level errors for the identity provider.
///
/// Protocol errors map onto RFC 6749 §5.2 error codes in the HTTP response.
/// Reasons attached to `InvalidGrant` / `InvalidToken` are returned to the
/// client as `error_description`; they name the check that failed, never the
/// stored values it was checked against.
#[derive(Debug, Error)]
pub enum IdpError {
    /// Unknown client id, or a redirect URI not registered for the client.
    #[error("Unknown client or unregistered redirect URI")]
    InvalidClient,

    /// The authorization code or refresh grant was rejected.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// A presented token failed validation.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The grant type is not supported by the token endpoint.
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// The request was missing a required parameter or malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The key store could not produce a usable signing key.
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Internal server error.
    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct OAuthErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
}

impl IntoResponse for IdpError {
    fn into_response(self) -> Response {
        let (status, error, description) = match self {
            IdpError::InvalidClient => (
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                Some("Unknown client or unregistered redirect URI".to_string()),
            ),
            IdpError::InvalidGrant(reason) => {
                (StatusCode::BAD_REQUEST, "invalid_grant", Some(reason))
            }
            IdpError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "invalid_token", Some(reason))
            }
            IdpError::UnsupportedGrantType(grant_type) => (
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                Some(format!("Unsupported grant type: {grant_type}")),
            ),
            IdpError::InvalidRequest(reason) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(reason))
            }
            // Internal details never reach the wire
            IdpError::KeyStore(_) | IdpError::Crypto(_) | IdpError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                Some("An internal error occurred".to_string()),
            ),
        };

        let body = OAuthErrorResponse {
            error,
            error_description: description,
        };

        (status, Json(body)).into_response()
    }
}
