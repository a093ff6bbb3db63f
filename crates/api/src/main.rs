//! API server entry point.

use std::sync::Arc;

use api::auth::{FirebaseVerifier, TokenIssuer};
use api::sweeper::Sweeper;
use api::{AppState, Config};
use billing::StripeClient;
use database::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(addr = %config.addr, "Starting API server");

    // Connect to database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    // Build application state
    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl_secs);
    let verifier = Arc::new(FirebaseVerifier::new(&config.firebase_project_id)?);
    let mut state = AppState::new(db.clone(), config.policy, tokens, verifier);

    match config.stripe.clone() {
        Some(stripe) => state = state.with_stripe(StripeClient::new(stripe)?),
        None => warn!("STRIPE_SECRET_KEY not set, billing routes are disabled"),
    }
    match config.admin_api_key.clone() {
        Some(key) => state = state.with_admin_key(key),
        None => warn!("ADMIN_API_KEY not set, admin routes are disabled"),
    }

    // Background housekeeping
    let sweeper = Sweeper::new(
        db.clone(),
        config.policy,
        config.sweep_interval,
        config.daily_limit_retention_days,
    )
    .spawn();

    // Start server
    let app = api::app(state, &config.cors_origins);
    info!(addr = %config.addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    db.close().await;
    info!("API server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
