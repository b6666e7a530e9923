use crate::errors::IdpError;
use crate::models::{TokenRequest, TokenResponse};
use axum::{extract::State, Form, Json};
use std::sync::Arc;
use tracing::instrument;

use super::AppState;

/// Handle a token request
///
/// POST /oauth/token (form-encoded)
///
/// Supports the `authorization_code` and `refresh_token` grants. Errors
/// come back as OAuth error JSON via `IdpError::into_response`.
#[instrument(name = "idp.token.post", skip_all, fields(grant_type = %request.grant_type))]
pub async fn token(
    State(state): State<Arc<AppState>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, IdpError> {
    match request.grant_type.as_str() {
        "authorization_code" => {
            let code = require(request.code.as_deref(), "code")?;
            let verifier = require(request.code_verifier.as_deref(), "code_verifier")?;
            let client_id = require(request.client_id.as_deref(), "client_id")?;
            let redirect_uri = require(request.redirect_uri.as_deref(), "redirect_uri")?;

            let response = state
                .flow
                .exchange(code, verifier, client_id, redirect_uri)
                .await?;
            Ok(Json(response))
        }
        "refresh_token" => {
            let refresh_token = require(request.refresh_token.as_deref(), "refresh_token")?;
            let response = state.flow.refresh(refresh_token).await?;
            Ok(Json(response))
        }
        other => Err(IdpError::UnsupportedGrantType(other.to_string())),
    }
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, IdpError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IdpError::InvalidRequest(format!("Missing required parameter: {name}")))
}
