//! Payment gateway webhook models.
//!
//! Only the fields the wallet acts on are decoded; everything else in the
//! gateway's event is ignored.
//!
//! # Example
//!
//! ```json
//! {
//!   "id": "evt_1Nx...",
//!   "type": "checkout.session.completed",
//!   "data": {
//!     "object": {
//!       "id": "cs_test_a1b2...",
//!       "amount_total": 10000,
//!       "currency": "inr",
//!       "payment_intent": "pi_3Nx...",
//!       "metadata": { "userId": "550e8400-e29b-41d4-a716-446655440000" }
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kind that credits a wallet. All others are acknowledged and ignored.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Session metadata key carrying the wallet owner.
pub const USER_ID_METADATA_KEY: &str = "userId";

#[derive(Debug, Deserialize)]
pub struct GatewayEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Absent or partial on some event kinds; only completion events need it.
    #[serde(default)]
    pub data: GatewayEventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct GatewayEventData {
    /// Decoded further only for event kinds the wallet handles.
    #[serde(default)]
    pub object: Value,
}

/// Checkout session object, both as returned by session creation and as
/// embedded in completion events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,

    /// Hosted checkout page. Present on creation responses.
    pub url: Option<String>,

    /// Charged total in minor units.
    pub amount_total: Option<i64>,

    pub currency: Option<String>,

    pub payment_intent: Option<String>,

    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl CheckoutSession {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Body returned to the gateway for every accepted delivery.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self { received: true }
    }
}
