//! Wallet account model and balance response.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::money::to_major_units;

/// One wallet balance per user.
///
/// # Database Table
///
/// Maps to the `accounts` table. `user_id` is unique, so concurrent first
/// access converges on a single row.
///
/// # Balance Storage
///
/// Balances are `i64` minor units (paise), never floats:
/// - ₹10.50 is stored as 1050
/// - ₹100.00 is stored as 10000
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,

    /// Identity provider's user id. The wallet does not own the user record.
    pub user_id: Uuid,

    /// Spendable balance in minor units.
    ///
    /// Never negative (CHECK constraint plus conditional debit).
    pub balance_minor: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /funds/balance` response.
///
/// ```json
/// { "balanceMinorUnits": 10000, "balance": 100.0 }
/// ```
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance_minor_units: i64,
    pub balance: f64,
}

impl From<Account> for BalanceResponse {
    fn from(account: Account) -> Self {
        Self {
            balance_minor_units: account.balance_minor,
            balance: to_major_units(account.balance_minor),
        }
    }
}
