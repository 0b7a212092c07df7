//! Account Store, Transaction Ledger and user directory seams.
//!
//! The wallet never holds in-process locks; every balance mutation is a single
//! atomic call on a [`LedgerStore`]. Two backends exist:
//!
//! - [`postgres::PgStore`]: SQL transactions, `FOR UPDATE` row locks and a
//!   unique idempotency key column.
//! - [`memory::MemoryStore`]: one async mutex around plain collections, used
//!   by tests and local runs.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::Account;
use crate::models::transaction::{Earnings, Transaction};
use crate::models::user::User;

pub mod memory;
pub mod postgres;

/// A top-up to apply once per gateway session.
#[derive(Debug, Clone)]
pub struct NewTopup {
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    /// Gateway checkout session id, the idempotency key.
    pub session_id: String,
    pub meta: Value,
}

/// A peer transfer, already validated by the wallet service.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub meta: Value,
}

/// Result of [`LedgerStore::record_topup`].
#[derive(Debug, Clone)]
pub enum TopupOutcome {
    /// Balance credited and ledger row written.
    Applied(Transaction),
    /// The session id was already recorded; nothing changed.
    Duplicate,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> Result<(), AppError>;

    /// Existing account, or a new zero-balance one. Safe under concurrent
    /// first access for the same user.
    async fn get_or_create_account(&self, user_id: Uuid) -> Result<Account, AppError>;

    /// Add to a balance, creating the account if needed.
    async fn credit(&self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError>;

    /// Subtract from a balance. Fails with `InsufficientBalance` and writes
    /// nothing when the result would be negative.
    async fn debit(&self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError>;

    async fn find_topup_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Transaction>, AppError>;

    /// Insert-if-absent on the session id, then credit, as one unit.
    async fn record_topup(&self, topup: NewTopup) -> Result<TopupOutcome, AppError>;

    /// Debit sender, credit recipient and write one `transfer` row, as one unit.
    /// Returns the sender's account after the debit.
    async fn record_transfer(
        &self,
        transfer: NewTransfer,
    ) -> Result<(Account, Transaction), AppError>;

    /// Debit and write one `processed` `withdraw` row, as one unit.
    async fn record_withdrawal(
        &self,
        user_id: Uuid,
        amount_minor: i64,
        currency: &str,
        meta: Value,
    ) -> Result<(Account, Transaction), AppError>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError>;

    /// Settled incoming transfers and outgoing withdrawals, plus the newest
    /// `recent_limit` incoming transfers.
    async fn earnings(&self, user_id: Uuid, recent_limit: i64) -> Result<Earnings, AppError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// Case-insensitive exact match against the lowercase username index.
    async fn find_user_id_by_username(&self, username: &str) -> Result<Option<Uuid>, AppError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError>;
}
