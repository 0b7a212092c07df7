//! Ledger entry model and the funds API request/response types.
//!
//! This module defines:
//! - `Transaction`: append-only ledger row
//! - `TransactionType` / `TransactionStatus`: the closed sets stored as text
//! - Request bodies for top-up, donation, transfer and withdrawal
//! - Response bodies, including the earnings summary

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::money::to_major_units;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Kind of balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Gateway checkout credited a wallet. No `from` side.
    Topup,
    /// Peer donation or transfer. Both sides set.
    Transfer,
    /// Simulated payout. No `to` side.
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Topup => "topup",
            TransactionType::Transfer => "transfer",
            TransactionType::Withdraw => "withdraw",
        }
    }
}

impl TryFrom<String> for TransactionType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "topup" => Ok(TransactionType::Topup),
            "transfer" => Ok(TransactionType::Transfer),
            "withdraw" => Ok(TransactionType::Withdraw),
            _ => Err(UnknownVariant {
                kind: "transaction type",
                value,
            }),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry status.
///
/// Top-ups and transfers are written as `success`. Withdrawals are written
/// as `processed` because payout is simulated synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Processed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Processed => "processed",
        }
    }

    /// Statuses that count towards earnings totals.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success | TransactionStatus::Processed
        )
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            "processed" => Ok(TransactionStatus::Processed),
            _ => Err(UnknownVariant {
                kind: "transaction status",
                value,
            }),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a ledger row from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Rows are never updated after insert.
/// For top-ups, `idempotency_key` holds the gateway checkout session id and
/// is unique across the ledger.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,

    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,

    /// Always positive (CHECK constraint).
    #[serde(rename = "amountMinorUnits")]
    pub amount_minor: i64,

    pub currency: String,

    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,

    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,

    /// `sessionId`/`paymentIntent` for top-ups, `label`/`message` for transfers.
    pub meta: Value,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn message(&self) -> Option<&str> {
        self.meta.get("message").and_then(Value::as_str)
    }

    /// Whether `user_id` is the sender or the recipient.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.from_user_id == Some(user_id) || self.to_user_id == Some(user_id)
    }
}

/// `POST /funds/topup`. Amount is in major units.
#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct TopupResponse {
    pub url: String,
}

/// `POST /funds/donate`. One of `toUserId` / `toUsername` is required.
///
/// ```json
/// { "toUsername": "asha", "amount": 30, "message": "nice work" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonateRequest {
    pub to_user_id: Option<Uuid>,
    pub to_username: Option<String>,
    pub amount: f64,
    pub message: Option<String>,
}

/// `POST /funds/transfer`. Plain peer transfer without a message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub to_user_id: Uuid,
    pub amount: f64,
}

/// `POST /funds/withdraw`.
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: f64,
}

/// Response for donations and transfers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub ok: bool,
    pub balance_minor_units: i64,
    pub transaction_id: Uuid,
}

/// Response for withdrawals. `status` is always `processed`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub ok: bool,
    pub balance_minor_units: i64,
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
}

/// Incoming transfer shown on a creator's public page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTransfer {
    pub id: Uuid,
    pub from_user_id: Option<Uuid>,
    pub amount_minor_units: i64,
    pub amount: f64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for RecentTransfer {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            from_user_id: transaction.from_user_id,
            amount_minor_units: transaction.amount_minor,
            amount: to_major_units(transaction.amount_minor),
            message: transaction.message().map(str::to_string),
            created_at: transaction.created_at,
        }
    }
}

/// Aggregates computed by the store, in minor units.
#[derive(Debug, Clone, Default)]
pub struct Earnings {
    pub total_received_minor: i64,
    pub total_withdrawn_minor: i64,
    pub recent: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsTotals {
    pub total_received_minor_units: i64,
    pub total_received: f64,
    pub total_withdrawn_minor_units: i64,
    pub total_withdrawn: f64,
    pub net_earned_minor_units: i64,
    pub net_earned: f64,
}

/// `GET /funds/earnings` response.
#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    pub totals: EarningsTotals,
    pub recent: Vec<RecentTransfer>,
}

impl From<Earnings> for EarningsResponse {
    fn from(earnings: Earnings) -> Self {
        let net = earnings.total_received_minor - earnings.total_withdrawn_minor;
        Self {
            totals: EarningsTotals {
                total_received_minor_units: earnings.total_received_minor,
                total_received: to_major_units(earnings.total_received_minor),
                total_withdrawn_minor_units: earnings.total_withdrawn_minor,
                total_withdrawn: to_major_units(earnings.total_withdrawn_minor),
                net_earned_minor_units: net,
                net_earned: to_major_units(net),
            },
            recent: earnings.recent.into_iter().map(Into::into).collect(),
        }
    }
}
