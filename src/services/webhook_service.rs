//! Inbound webhook authentication and decoding.
//!
//! The gateway signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` and sends
//! `Stripe-Signature: t=<unix seconds>,v1=<hex>[,v1=<hex>...]`.
//! A delivery is authentic when any `v1` entry matches and the timestamp is
//! within the configured tolerance, which bounds replay of captured requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{error, warn};

use crate::config::WebhookVerification;
use crate::error::AppError;
use crate::models::webhook::{CheckoutSession, GatewayEvent};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn signed_mac(secret: &[u8], timestamp: &str, payload: &[u8]) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produce a signature header for `payload`, in the gateway's format.
///
/// # Format
///
/// `t=<timestamp>,v1=<hex_encoded_hmac>`
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> Result<String, AppError> {
    let t = timestamp.to_string();
    let mac = signed_mac(secret.as_bytes(), &t, payload)?;
    Ok(format!("t={},v1={}", t, hex::encode(mac.finalize().into_bytes())))
}

/// Check a signature header against the raw body.
///
/// Comparison is constant-time (`Mac::verify_slice`).
pub fn verify_signature(
    secret: &SecretString,
    payload: &[u8],
    header: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    let signed_at: i64 = timestamp.parse().map_err(|_| AppError::InvalidSignature)?;

    let age = now.timestamp().abs_diff(signed_at);
    if age > tolerance.as_secs() {
        warn!(age_secs = age, "webhook timestamp outside tolerance");
        return Err(AppError::InvalidSignature);
    }

    let mac = signed_mac(secret.expose_secret().as_bytes(), timestamp, payload)?;

    let matched = candidates
        .into_iter()
        .filter_map(|candidate| hex::decode(candidate).ok())
        .any(|expected| mac.clone().verify_slice(&expected).is_ok());

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

/// Apply the configured verification mode to one delivery.
pub fn authenticate(
    verification: &WebhookVerification,
    payload: &[u8],
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    match verification {
        WebhookVerification::Signed { secret, tolerance } => {
            let result = signature
                .ok_or(AppError::InvalidSignature)
                .and_then(|header| verify_signature(secret, payload, header, *tolerance, now));

            if result.is_err() {
                warn!(
                    signature_present = signature.is_some(),
                    "webhook signature rejected, potential forgery"
                );
            }
            result
        }
        WebhookVerification::Unverified(_) => {
            warn!("webhook signature NOT verified: development bypass is enabled");
            Ok(())
        }
        WebhookVerification::Unconfigured => {
            error!("webhook received but STRIPE_WEBHOOK_SECRET is not configured");
            Err(AppError::WebhookNotConfigured)
        }
    }
}

pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, AppError> {
    serde_json::from_slice(payload)
        .map_err(|e| AppError::MalformedPayload(format!("Invalid event: {}", e)))
}

/// Decode the checkout session embedded in a completion event.
pub fn checkout_session(event: &GatewayEvent) -> Result<CheckoutSession, AppError> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::MalformedPayload(format!("Invalid checkout session: {}", e)))
}
