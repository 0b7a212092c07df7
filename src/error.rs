//! Error types and HTTP error response handling.
//!
//! Every failure the wallet can surface is a variant of [`AppError`]. The
//! variant decides the HTTP status, which in turn decides whether a caller
//! (a browser, or the payment gateway's redelivery schedule) retries.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation**: bad amounts or malformed bodies, rejected before any store access
/// - **Authorization**: missing/invalid session, stale federated session
/// - **Business rules**: insufficient balance, self-payment, unknown recipient
/// - **Integrity**: webhook signature or payload problems (never retried)
/// - **Transient**: store or gateway failures (safe to retry)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error, pool timeout).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No valid session accompanied the request.
    #[error("Unauthorized")]
    Unauthorized,

    /// Federated session is too old for a credential change.
    #[error("Re-authentication required")]
    ReAuthRequired { re_auth_url: Option<String> },

    /// Current password missing or wrong on a credential change.
    #[error("Current password is incorrect")]
    InvalidCredentials,

    /// Amount is non-positive, not finite, or under a configured minimum.
    #[error("Invalid amount")]
    InvalidAmount(String),

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("You cannot pay yourself")]
    SelfPaymentForbidden,

    #[error("Recipient not found")]
    RecipientNotFound,

    #[error("Transaction not found")]
    TransactionNotFound,

    /// Account has insufficient balance for the requested debit.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Webhook signature missing, malformed, expired or wrong.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook body could not be decoded.
    #[error("Malformed payload")]
    MalformedPayload(String),

    /// Webhook verification has no secret and no development bypass.
    #[error("Webhook verification is not configured")]
    WebhookNotConfigured,

    /// Payment gateway unreachable, misconfigured or returned an error.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ReAuthRequired { .. } => StatusCode::FORBIDDEN,
            AppError::RecipientNotFound | AppError::TransactionNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials
            | AppError::InvalidAmount(_)
            | AppError::InvalidRequest(_)
            | AppError::SelfPaymentForbidden
            | AppError::InsufficientBalance
            | AppError::InvalidSignature
            | AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_)
            | AppError::WebhookNotConfigured
            | AppError::Gateway(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
            AppError::Unauthorized => "unauthorized",
            AppError::ReAuthRequired { .. } => "reauth_required",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::SelfPaymentForbidden => "self_payment_forbidden",
            AppError::RecipientNotFound => "recipient_not_found",
            AppError::TransactionNotFound => "transaction_not_found",
            AppError::InsufficientBalance => "insufficient_balance",
            AppError::InvalidSignature => "invalid_signature",
            AppError::MalformedPayload(_) => "malformed_payload",
            AppError::WebhookNotConfigured => "webhook_not_configured",
            AppError::Gateway(_) => "gateway_error",
        }
    }
}

/// Body rejections from the JSON extractor are validation errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_balance",
///     "message": "Insufficient balance"
///   }
/// }
/// ```
///
/// `reauth_required` errors carry an extra `reAuthUrl` field pointing at the
/// federated sign-in entry point. Internal failures hide their details.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            AppError::InvalidAmount(msg)
            | AppError::InvalidRequest(msg)
            | AppError::MalformedPayload(msg) => msg.clone(),
            AppError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                "An internal error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                "An internal error occurred".to_string()
            }
            AppError::Gateway(e) => {
                tracing::error!(error = %e, "payment gateway failure");
                "Payment gateway is unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = match self {
            AppError::ReAuthRequired { re_auth_url } => json!({
                "error": {
                    "code": code,
                    "message": message,
                    "reAuthUrl": re_auth_url
                }
            }),
            _ => json!({
                "error": {
                    "code": code,
                    "message": message
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_violations_are_client_errors() {
        assert_eq!(
            AppError::InsufficientBalance.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::SelfPaymentForbidden.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RecipientNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn transient_failures_ask_for_retry() {
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Gateway("timeout".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::InvalidSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
