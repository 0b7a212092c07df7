//! Payment gateway webhook endpoint.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;

use crate::{
    app::AppState,
    error::AppError,
    models::webhook::WebhookAck,
    services::{wallet_service, webhook_service::SIGNATURE_HEADER},
};

/// Receive a gateway event.
///
/// The body is taken as raw bytes: the signature covers the exact bytes the
/// gateway sent, so it must be verified before any JSON parsing.
///
/// # Response
///
/// - 200 `{"received": true}`: credited, already credited, ignored event
///   kind, or unattributable session (logged)
/// - 400: bad signature or malformed payload; the gateway does not retry
/// - 500: persistence failure or no webhook secret; the gateway retries
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    wallet_service::complete_topup(
        state.ledger.as_ref(),
        &state.settings.webhook_verification,
        &state.settings.currency,
        &body,
        signature,
        Utc::now(),
    )
    .await?;

    Ok(Json(WebhookAck::received()))
}
