use crate::handlers::{
    authorize_handler, discovery_handler, jwks_handler, token_handler, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // OIDC discovery and key publication (RFC 8414 well-known paths)
        .route(
            "/.well-known/openid-configuration",
            get(discovery_handler::get_discovery),
        )
        .route("/.well-known/jwks.json", get(jwks_handler::get_jwks))
        // OAuth 2.0 authorization-code flow
        .route("/oauth/authorize", get(authorize_handler::authorize))
        .route("/oauth/token", post(token_handler::token))
        // Health check
        .route("/health", get(health_check))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
