use crate::models::DiscoveryDocument;
use axum::{
    extract::State,
    http::header::{HeaderMap, HeaderValue, CACHE_CONTROL},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::AppState;

/// Handle OIDC discovery request
///
/// GET /.well-known/openid-configuration
///
/// The document is a pure function of the configured issuer URL.
#[instrument(name = "idp.discovery.get", skip_all)]
pub async fn get_discovery(
    State(state): State<Arc<AppState>>,
) -> (HeaderMap, Json<DiscoveryDocument>) {
    let document = DiscoveryDocument::for_issuer(&state.config.issuer);

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=3600"));

    (headers, Json(document))
}
