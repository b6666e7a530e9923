use crate::models::Jwks;
use crate::observability::metrics::record_jwks_request;
use axum::{
    extract::State,
    http::header::{HeaderMap, HeaderValue, CACHE_CONTROL},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::AppState;

/// Handle JWKS request
///
/// GET /.well-known/jwks.json
///
/// Returns the current verification keys (Active and Retiring) in JWKS
/// format (RFC 7517) with Cache-Control set to max-age=3600. Relying
/// parties whose cache TTL matches this header tolerate rotation through
/// the Retiring grace period.
#[instrument(name = "idp.jwks.get", skip_all)]
pub async fn get_jwks(State(state): State<Arc<AppState>>) -> (HeaderMap, Json<Jwks>) {
    record_jwks_request();

    let jwks = state.keystore.to_jwks().await;

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=3600"));

    (headers, Json(jwks))
}
