//! Relaygate - AI request gateway
//!
//! This is the main entry point for the gateway service.
//!
//! # Configuration
//!
//! Set `RELAYGATE_CONFIG` to a JSON file to override defaults. `LISTEN_ADDR`,
//! `DATA_DIR`, `PROVIDER_URL`, `PROVIDER_API_KEY`, `PROVIDER_MODEL`,
//! `AUTH_ISSUER`, `AUTH_JWKS_URL`, and `AUTH_AUDIENCE` override the file.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to use a mock JWT validator that doesn't
//! require network access to the issuer.
//! Use tokens in format: `test-token:<owner-uuid>[:<tier>]`

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(feature = "dev-mode"))]
use relaygate_auth::JwksValidator;
#[cfg(feature = "dev-mode")]
use relaygate_auth::MockJwtValidator;
use relaygate_control::{CircuitBreaker, HttpProviderAdapter};
use relaygate_gateway::{create_router, GatewayConfig, GatewayMiddleware, GatewayState};
use relaygate_store::{MemoryCounterStore, RocksStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaygate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting relaygate");

    let config = GatewayConfig::load()?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        provider_url = %config.provider.base_url,
        provider_model = %config.provider.model,
        auth_issuer = %config.auth.issuer,
        "Gateway configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);
    let counters = Arc::new(MemoryCounterStore::new());

    let provider = Arc::new(HttpProviderAdapter::new(config.provider.clone())?);
    if config.provider.api_key.is_none() {
        tracing::warn!("No PROVIDER_API_KEY set - provider calls are unauthenticated");
    }

    // Initialize JWT validator
    #[cfg(feature = "dev-mode")]
    let jwt_validator = {
        tracing::warn!("DEV MODE ENABLED - using mock JWT validator");
        tracing::warn!("Use tokens in format: test-token:<owner-uuid>[:<tier>]");
        Arc::new(MockJwtValidator::default())
    };

    #[cfg(not(feature = "dev-mode"))]
    let jwt_validator = Arc::new(JwksValidator::new(config.auth.clone())?);
    tracing::info!("JWT validator initialized");

    let circuit = Arc::new(CircuitBreaker::new(config.control.circuit));
    tracing::info!(
        failure_threshold = config.control.circuit.failure_threshold,
        reset_timeout_seconds = config.control.circuit.reset_timeout_seconds,
        "Provider circuit breaker initialized"
    );

    let middleware = Arc::new(GatewayMiddleware::new(
        store,
        counters.clone(),
        provider,
        circuit,
        jwt_validator,
        &config.control,
        config.slow_request_threshold(),
    ));

    // Fails tasks orphaned by a previous run, then keeps sweeping.
    let sweeper = Arc::clone(&middleware);
    let sweep_interval = config.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.maintain() {
                tracing::error!(error = %e, "Maintenance pass failed");
            }
            let expired = counters.purge_expired();
            if expired > 0 {
                tracing::debug!(expired, "Purged expired quota counters");
            }
        }
    });

    let listen_addr = config.listen_addr.clone();
    let app = create_router(GatewayState::new(middleware, config));
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
