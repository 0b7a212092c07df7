//! Liveness and store connectivity probe.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{app::AppState, error::AppError};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub currency: String,
    pub checked_at: DateTime<Utc>,
}

/// `GET /health`
///
/// ```json
/// { "status": "healthy", "store": "reachable", "currency": "INR", "checked_at": "..." }
/// ```
///
/// An unreachable store surfaces as the standard 500 error body.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.ledger.ping().await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        store: "reachable",
        currency: state.settings.currency.clone(),
        checked_at: Utc::now(),
    }))
}
