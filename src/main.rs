//! Chai Wallet Server - Main Application Entry Point
//!
//! REST API for the wallet behind a creator-donation site: gateway top-ups,
//! donations, transfers, simulated withdrawals and the re-authentication
//! gate on password changes.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: HS256 session tokens from the identity provider
//! - **Payments**: Stripe-compatible hosted checkout, signed webhooks
//!
//! # Startup Flow
//!
//! 1. Load and validate configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the store, gateway client and HTTP router
//! 5. Serve until Ctrl-C / SIGTERM, then close the pool

use std::sync::Arc;

use chai_wallet_server::{
    app::{self, AppState, WalletSettings},
    config::{Config, WebhookVerification},
    db,
    middleware::auth::SessionKeys,
    services::payment_gateway::StripeGateway,
    store::postgres::PgStore,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!("failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(environment = ?config.environment, currency = %config.currency, "Configuration loaded");

    match &config.webhook_verification {
        WebhookVerification::Signed { .. } => {}
        WebhookVerification::Unverified(_) => {
            tracing::warn!("ALLOW_UNSIGNED_WEBHOOKS is set: webhook signatures will NOT be verified")
        }
        WebhookVerification::Unconfigured => {
            tracing::warn!("STRIPE_WEBHOOK_SECRET is not set: webhooks will be refused")
        }
    }

    let pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        config.db_acquire_timeout,
    )
    .await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool.clone()));
    let gateway = StripeGateway::new(&config.gateway)?;

    let state = AppState {
        ledger: store.clone(),
        users: store,
        gateway: Arc::new(gateway),
        sessions: Arc::new(SessionKeys::new(&config.session_secret)),
        settings: Arc::new(WalletSettings::from(&config)),
    };

    let router = app::build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Database pool closed");

    Ok(())
}
