use crate::errors::IdpError;
use crate::models::AuthorizeParams;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
};
use std::sync::Arc;
use tracing::instrument;

use super::AppState;

/// Handle an authorization request
///
/// GET /oauth/authorize
///
/// The login gateway has already authenticated the browser session; this
/// handler validates the OAuth parameters, issues a single-use code, and
/// redirects back to the client with `code` and the echoed `state`.
#[instrument(name = "idp.authorize.get", skip_all, fields(client_id = %params.client_id))]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, IdpError> {
    let user = state
        .login
        .resolve(&headers)
        .ok_or_else(|| IdpError::InvalidToken("Authentication required".to_string()))?;

    let code = state.flow.start_authorization(&params, user).await?;

    let mut location = format!(
        "{}?code={}",
        params.redirect_uri,
        percent_encode_query(&code)
    );
    if let Some(client_state) = &params.state {
        location.push_str("&state=");
        location.push_str(&percent_encode_query(client_state));
    }

    Ok(Redirect::to(&location))
}

/// Percent-encode a query component (RFC 3986 unreserved characters pass
/// through).
fn percent_encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode_passes_unreserved() {
        assert_eq!(
            percent_encode_query("abc-XYZ_0.9~"),
            "abc-XYZ_0.9~".to_string()
        );
    }

    #[test]
    fn test_percent_encode_escapes_delimiters() {
        assert_eq!(percent_encode_query("a&b=c"), "a%26b%3Dc");
        assert_eq!(percent_encode_query("n:v"), "n%3Av");
        assert_eq!(percent_encode_query("sp ace"), "sp%20ace");
    }

    #[test]
    fn test_percent_encode_state_format_is_reversible_shape() {
        // The provider's own state format only needs ':' escaped
        let encoded = percent_encode_query("uuid-nonce:dmVyaWZpZXI");
        assert_eq!(encoded, "uuid-nonce%3AdmVyaWZpZXI");
    }
}
