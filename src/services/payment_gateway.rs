//! Hosted checkout client for a Stripe-compatible payment gateway.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::webhook::{CheckoutSession, USER_ID_METADATA_KEY};

/// What the wallet asks the gateway to charge.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session tagged with the wallet owner.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    base_url: String,
    secret_key: Option<SecretString>,
}

impl StripeGateway {
    /// Build the client with a bounded request timeout.
    pub fn new(config: &GatewayConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn form(request: &CheckoutRequest) -> Vec<(String, String)> {
        vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            (
                "line_items[0][price_data][currency]".into(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                "Wallet Top-up".into(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_minor.to_string(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                format!("metadata[{}]", USER_ID_METADATA_KEY),
                request.user_id.to_string(),
            ),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        let secret_key = self
            .secret_key
            .as_ref()
            .ok_or_else(|| AppError::Gateway("STRIPE_SECRET_KEY is not set".to_string()))?;

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(secret_key.expose_secret())
            .form(&Self::form(request))
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GatewayErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "unknown error".to_string());

            warn!(status = %status, gateway_message = %message, "checkout session creation failed");
            return Err(AppError::Gateway(format!("{}: {}", status, message)));
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| AppError::Gateway(format!("Unreadable checkout session: {}", e)))
    }
}
