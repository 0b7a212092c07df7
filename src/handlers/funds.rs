//! Wallet HTTP handlers.
//!
//! This module implements the session-authenticated funds endpoints:
//! - GET /funds/balance - Current wallet balance
//! - POST /funds/topup - Start a gateway checkout
//! - POST /funds/donate - Donate to a creator, by id or username
//! - POST /funds/transfer - Plain peer transfer
//! - POST /funds/withdraw - Simulated payout
//! - GET /funds/earnings - Received/withdrawn totals and recent donations
//! - GET /funds/transactions/{id} - One ledger entry the caller took part in
//!
//! Amounts arrive in major units and are converted to minor units here,
//! before any service call.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use super::ApiJson;
use crate::{
    app::AppState,
    error::AppError,
    models::{
        account::BalanceResponse,
        session::SessionClaims,
        transaction::{
            DonateRequest, EarningsResponse, TopupRequest, TopupResponse, Transaction,
            TransferRequest, TransferResponse, WithdrawRequest, WithdrawResponse,
        },
    },
    money::to_minor_units,
    services::wallet_service::{self, Recipient, TransferCommand, TransferKind},
};

/// Current balance. Creates the wallet on first access.
///
/// # Response (200)
///
/// ```json
/// { "balanceMinorUnits": 10000, "balance": 100.0 }
/// ```
pub async fn balance(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<BalanceResponse>, AppError> {
    let account = wallet_service::balance(state.ledger.as_ref(), claims.user_id()).await?;
    Ok(Json(account.into()))
}

/// Start a top-up.
///
/// # Request Body
///
/// ```json
/// { "amount": 100 }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "url": "https://checkout.stripe.com/c/pay/cs_test_..." }
/// ```
///
/// The balance is credited later, by the gateway webhook.
pub async fn topup(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(request): ApiJson<TopupRequest>,
) -> Result<Json<TopupResponse>, AppError> {
    let amount_minor = to_minor_units(request.amount)?;

    let url = wallet_service::create_topup_intent(
        state.gateway.as_ref(),
        claims.user_id(),
        amount_minor,
        &state.settings.currency,
        &state.settings.public_base_url,
    )
    .await?;

    Ok(Json(TopupResponse { url }))
}

fn recipient(request: &DonateRequest) -> Result<Recipient, AppError> {
    if let Some(id) = request.to_user_id {
        return Ok(Recipient::Id(id));
    }

    request
        .to_username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| Recipient::Username(name.to_string()))
        .ok_or_else(|| AppError::InvalidRequest("toUserId or toUsername is required".to_string()))
}

/// Donate to a creator.
///
/// # Request Body
///
/// ```json
/// { "toUsername": "asha", "amount": 30, "message": "nice work" }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "ok": true, "balanceMinorUnits": 7000, "transactionId": "770e8400-..." }
/// ```
///
/// # Errors
///
/// - 400: invalid amount, self-payment, insufficient balance, no recipient given
/// - 404: recipient not found
pub async fn donate(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(request): ApiJson<DonateRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let amount_minor = to_minor_units(request.amount)?;
    let recipient = recipient(&request)?;

    let receipt = wallet_service::transfer(
        state.ledger.as_ref(),
        state.users.as_ref(),
        TransferCommand {
            from_user_id: claims.user_id(),
            recipient,
            amount_minor,
            message: request.message,
            kind: TransferKind::Donation,
        },
        &state.settings.currency,
    )
    .await?;

    Ok(Json(TransferResponse {
        ok: true,
        balance_minor_units: receipt.account.balance_minor,
        transaction_id: receipt.transaction.id,
    }))
}

/// Peer transfer to a known user id. Same rules as [`donate`], no message.
pub async fn transfer(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let amount_minor = to_minor_units(request.amount)?;

    let receipt = wallet_service::transfer(
        state.ledger.as_ref(),
        state.users.as_ref(),
        TransferCommand {
            from_user_id: claims.user_id(),
            recipient: Recipient::Id(request.to_user_id),
            amount_minor,
            message: None,
            kind: TransferKind::Transfer,
        },
        &state.settings.currency,
    )
    .await?;

    Ok(Json(TransferResponse {
        ok: true,
        balance_minor_units: receipt.account.balance_minor,
        transaction_id: receipt.transaction.id,
    }))
}

/// Withdraw funds. The payout is simulated and completes immediately.
///
/// # Response (200)
///
/// ```json
/// { "ok": true, "balanceMinorUnits": 0, "transactionId": "...", "status": "processed" }
/// ```
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(request): ApiJson<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, AppError> {
    let amount_minor = to_minor_units(request.amount)?;

    let receipt = wallet_service::withdraw(
        state.ledger.as_ref(),
        claims.user_id(),
        amount_minor,
        &state.settings.currency,
    )
    .await?;

    Ok(Json(WithdrawResponse {
        ok: true,
        balance_minor_units: receipt.account.balance_minor,
        transaction_id: receipt.transaction.id,
        status: receipt.transaction.status,
    }))
}

pub async fn earnings(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<EarningsResponse>, AppError> {
    let earnings = wallet_service::earnings(state.ledger.as_ref(), claims.user_id()).await?;
    Ok(Json(earnings.into()))
}

/// Get one ledger entry.
///
/// Returns 404 both for unknown ids and for entries the caller is not a
/// party to, so ids of other users' transactions are not confirmed.
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let transaction =
        wallet_service::transaction_for(state.ledger.as_ref(), claims.user_id(), id).await?;
    Ok(Json(transaction))
}
