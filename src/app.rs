//! Shared application state and router assembly.

use std::sync::Arc;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware as axum_middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{Config, WebhookVerification};
use crate::handlers;
use crate::middleware::auth::{SessionKeys, auth_middleware};
use crate::services::payment_gateway::PaymentGateway;
use crate::store::{LedgerStore, UserDirectory};

/// Deployment settings the wallet operations read on every request.
#[derive(Debug, Clone)]
pub struct WalletSettings {
    /// ISO code, uppercase.
    pub currency: String,
    /// Origin of the web app, without trailing slash.
    pub public_base_url: String,
    pub webhook_verification: WebhookVerification,
}

impl From<&Config> for WalletSettings {
    fn from(config: &Config) -> Self {
        Self {
            currency: config.currency.clone(),
            public_base_url: config.public_base_url.clone(),
            webhook_verification: config.webhook_verification.clone(),
        }
    }
}

/// Handles to every external collaborator, constructed once in `main` and
/// cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub users: Arc<dyn UserDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub sessions: Arc<SessionKeys>,
    pub settings: Arc<WalletSettings>,
}

fn cors_layer(public_base_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let origin = url::Url::parse(public_base_url)
        .ok()
        .map(|url| url.origin().ascii_serialization())
        .and_then(|origin| HeaderValue::from_str(&origin).ok());

    match origin {
        Some(origin) => cors.allow_origin(origin),
        None => cors,
    }
}

/// Build the HTTP router.
///
/// # Routes
///
/// Public:
/// - `GET /health`
/// - `POST /payments/webhook` (authenticated by gateway signature instead)
///
/// Session required:
/// - `GET /funds/balance`, `GET /funds/earnings`, `GET /funds/transactions/{id}`
/// - `POST /funds/topup`, `/funds/donate`, `/funds/transfer`, `/funds/withdraw`
/// - `POST /auth/reauth`, `/auth/password`
pub fn build_router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route("/funds/balance", get(handlers::funds::balance))
        .route("/funds/topup", post(handlers::funds::topup))
        .route("/funds/donate", post(handlers::funds::donate))
        .route("/funds/transfer", post(handlers::funds::transfer))
        .route("/funds/withdraw", post(handlers::funds::withdraw))
        .route("/funds/earnings", get(handlers::funds::earnings))
        .route(
            "/funds/transactions/{id}",
            get(handlers::funds::get_transaction),
        )
        .route("/auth/reauth", post(handlers::auth::reauth))
        .route("/auth/password", post(handlers::auth::change_password))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let cors = cors_layer(&state.settings.public_base_url);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/payments/webhook", post(handlers::payments::webhook))
        .merge(authenticated_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
