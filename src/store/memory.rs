//! In-process backend.
//!
//! Every call takes one async mutex for its whole duration, which makes each
//! composite operation atomic the same way a SQL transaction would.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{LedgerStore, NewTopup, NewTransfer, TopupOutcome, UserDirectory};
use crate::error::AppError;
use crate::models::account::Account;
use crate::models::transaction::{Earnings, Transaction, TransactionStatus, TransactionType};
use crate::models::user::{User, normalize_username};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    users: HashMap<Uuid, User>,
}

impl State {
    fn account_mut(&mut self, user_id: Uuid) -> &mut Account {
        self.accounts.entry(user_id).or_insert_with(|| {
            let now = Utc::now();
            Account {
                id: Uuid::new_v4(),
                user_id,
                balance_minor: 0,
                created_at: now,
                updated_at: now,
            }
        })
    }

    fn credit(&mut self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError> {
        let account = self.account_mut(user_id);
        account.balance_minor = account
            .balance_minor
            .checked_add(amount_minor)
            .ok_or_else(|| AppError::Internal("balance overflow".to_string()))?;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn debit(&mut self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError> {
        let account = self.account_mut(user_id);
        if account.balance_minor < amount_minor {
            return Err(AppError::InsufficientBalance);
        }
        account.balance_minor -= amount_minor;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_transaction(
        &mut self,
        transaction_type: TransactionType,
        from_user_id: Option<Uuid>,
        to_user_id: Option<Uuid>,
        amount_minor: i64,
        currency: &str,
        status: TransactionStatus,
        idempotency_key: Option<String>,
        meta: Value,
    ) -> Transaction {
        let transaction = Transaction {
            id: Uuid::new_v4(),
            transaction_type,
            from_user_id,
            to_user_id,
            amount_minor,
            currency: currency.to_string(),
            status,
            idempotency_key,
            meta,
            created_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        transaction
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity record, as the identity provider would.
    pub async fn insert_user(&self, user: User) {
        let mut user = user;
        user.username = normalize_username(&user.username);
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Every ledger row, oldest first.
    pub async fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.transactions.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_or_create_account(&self, user_id: Uuid) -> Result<Account, AppError> {
        Ok(self.state.lock().await.account_mut(user_id).clone())
    }

    async fn credit(&self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError> {
        self.state.lock().await.credit(user_id, amount_minor)
    }

    async fn debit(&self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError> {
        self.state.lock().await.debit(user_id, amount_minor)
    }

    async fn find_topup_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .find(|t| {
                t.transaction_type == TransactionType::Topup
                    && t.idempotency_key.as_deref() == Some(session_id)
            })
            .cloned())
    }

    async fn record_topup(&self, topup: NewTopup) -> Result<TopupOutcome, AppError> {
        let mut state = self.state.lock().await;

        let seen = state
            .transactions
            .iter()
            .any(|t| t.idempotency_key.as_deref() == Some(topup.session_id.as_str()));
        if seen {
            return Ok(TopupOutcome::Duplicate);
        }

        state.credit(topup.user_id, topup.amount_minor)?;
        let transaction = state.push_transaction(
            TransactionType::Topup,
            None,
            Some(topup.user_id),
            topup.amount_minor,
            &topup.currency,
            TransactionStatus::Success,
            Some(topup.session_id),
            topup.meta,
        );

        Ok(TopupOutcome::Applied(transaction))
    }

    async fn record_transfer(
        &self,
        transfer: NewTransfer,
    ) -> Result<(Account, Transaction), AppError> {
        let mut state = self.state.lock().await;

        state.account_mut(transfer.to_user_id);
        let donor = state.debit(transfer.from_user_id, transfer.amount_minor)?;
        state.credit(transfer.to_user_id, transfer.amount_minor)?;

        let transaction = state.push_transaction(
            TransactionType::Transfer,
            Some(transfer.from_user_id),
            Some(transfer.to_user_id),
            transfer.amount_minor,
            &transfer.currency,
            TransactionStatus::Success,
            None,
            transfer.meta,
        );

        Ok((donor, transaction))
    }

    async fn record_withdrawal(
        &self,
        user_id: Uuid,
        amount_minor: i64,
        currency: &str,
        meta: Value,
    ) -> Result<(Account, Transaction), AppError> {
        let mut state = self.state.lock().await;

        let account = state.debit(user_id, amount_minor)?;
        let transaction = state.push_transaction(
            TransactionType::Withdraw,
            Some(user_id),
            None,
            amount_minor,
            currency,
            TransactionStatus::Processed,
            None,
            meta,
        );

        Ok((account, transaction))
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn earnings(&self, user_id: Uuid, recent_limit: i64) -> Result<Earnings, AppError> {
        let state = self.state.lock().await;

        let incoming = |t: &&Transaction| {
            t.transaction_type == TransactionType::Transfer && t.to_user_id == Some(user_id)
        };

        let total_received_minor = state
            .transactions
            .iter()
            .filter(incoming)
            .filter(|t| t.status.is_settled())
            .map(|t| t.amount_minor)
            .sum();

        let total_withdrawn_minor = state
            .transactions
            .iter()
            .filter(|t| {
                t.transaction_type == TransactionType::Withdraw
                    && t.from_user_id == Some(user_id)
                    && t.status.is_settled()
            })
            .map(|t| t.amount_minor)
            .sum();

        let recent = state
            .transactions
            .iter()
            .rev()
            .filter(incoming)
            .take(usize::try_from(recent_limit).unwrap_or(0))
            .cloned()
            .collect();

        Ok(Earnings {
            total_received_minor,
            total_withdrawn_minor,
            recent,
        })
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_id_by_username(&self, username: &str) -> Result<Option<Uuid>, AppError> {
        let wanted = normalize_username(username);
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == wanted)
            .map(|u| u.id))
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(AppError::Unauthorized)?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }
}
