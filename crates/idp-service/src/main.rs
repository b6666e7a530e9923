use idp_service::config::Config;
use idp_service::handlers::AppState;
use idp_service::keystore::{self, KeyStore};
use idp_service::oauth::flow::{self, AuthorizationFlow};
use idp_service::oauth::login::GatewayLoginProvider;
use idp_service::routes;
use idp_service::services::token_issuer::TokenIssuer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idp_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Identity Provider");

    // Load configuration
    let config = Arc::new(Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?);

    info!("Configuration loaded successfully");

    // Bootstrap the signing key set; fatal if no active key can be produced
    info!("Initializing signing keys...");
    let keystore = KeyStore::bootstrap(config.key_grace_period)
        .await
        .map_err(|e| {
            error!("Failed to initialize signing key: {}", e);
            e
        })?;

    info!("Signing keys initialized");

    let token_issuer = Arc::new(TokenIssuer::new(Arc::clone(&keystore), &config));
    let auth_flow = Arc::new(AuthorizationFlow::new(
        Arc::clone(&config),
        Arc::clone(&keystore),
        token_issuer,
    ));

    // Background maintenance
    keystore::spawn_rotation_task(Arc::clone(&keystore), config.key_rotation_interval);
    flow::spawn_sweep_task(Arc::clone(&auth_flow), SWEEP_INTERVAL);

    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState {
        config,
        keystore,
        flow: auth_flow,
        login: Arc::new(GatewayLoginProvider),
    });

    let app = routes::build_routes(state);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Identity Provider listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
