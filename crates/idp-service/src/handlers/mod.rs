//! HTTP request handlers.

pub mod authorize_handler;
pub mod discovery_handler;
pub mod jwks_handler;
pub mod token_handler;

use crate::config::Config;
use crate::keystore::KeyStore;
use crate::oauth::flow::AuthorizationFlow;
use crate::oauth::login::LoginProvider;
use std::sync::Arc;

/// Shared application state for all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub keystore: Arc<KeyStore>,
    pub flow: Arc<AuthorizationFlow>,
    pub login: Arc<dyn LoginProvider>,
}
