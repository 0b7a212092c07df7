//! PostgreSQL backend.
//!
//! # Atomicity Guarantees
//!
//! Every composite operation runs in one PostgreSQL transaction. Debits are
//! conditional updates (`balance_minor >= $amount`), so a concurrent debit
//! can never drive a balance negative. Top-ups claim their idempotency key
//! with `ON CONFLICT DO NOTHING` before crediting.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{LedgerStore, NewTopup, NewTransfer, TopupOutcome, UserDirectory};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::account::Account;
use crate::models::transaction::{
    Earnings, Transaction, TransactionStatus, TransactionType,
};
use crate::models::user::{User, normalize_username};

/// Store client over a connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Make sure an account row exists. A concurrent creator wins silently.
async fn ensure_account(conn: &mut PgConnection, user_id: Uuid) -> Result<(), AppError> {
    sqlx::query("INSERT INTO accounts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn credit_in(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount_minor: i64,
) -> Result<Account, AppError> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (user_id, balance_minor)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE
        SET balance_minor = accounts.balance_minor + EXCLUDED.balance_minor,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(amount_minor)
    .fetch_one(&mut *conn)
    .await?;

    Ok(account)
}

async fn debit_in(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount_minor: i64,
) -> Result<Account, AppError> {
    ensure_account(conn, user_id).await?;

    // Check and write in one statement: no row comes back when the balance is short.
    sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET balance_minor = balance_minor - $1,
            updated_at = NOW()
        WHERE user_id = $2 AND balance_minor >= $1
        RETURNING *
        "#,
    )
    .bind(amount_minor)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::InsufficientBalance)
}

#[allow(clippy::too_many_arguments)]
async fn insert_transaction(
    conn: &mut PgConnection,
    transaction_type: TransactionType,
    from_user_id: Option<Uuid>,
    to_user_id: Option<Uuid>,
    amount_minor: i64,
    currency: &str,
    status: TransactionStatus,
    meta: Value,
) -> Result<Transaction, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            transaction_type,
            from_user_id,
            to_user_id,
            amount_minor,
            currency,
            status,
            meta
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(transaction_type.as_str())
    .bind(from_user_id)
    .bind(to_user_id)
    .bind(amount_minor)
    .bind(currency)
    .bind(status.as_str())
    .bind(meta)
    .fetch_one(&mut *conn)
    .await?;

    Ok(transaction)
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_or_create_account(&self, user_id: Uuid) -> Result<Account, AppError> {
        let mut conn = self.pool.acquire().await?;
        ensure_account(&mut conn, user_id).await?;

        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(account)
    }

    async fn credit(&self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError> {
        let mut conn = self.pool.acquire().await?;
        credit_in(&mut conn, user_id, amount_minor).await
    }

    async fn debit(&self, user_id: Uuid, amount_minor: i64) -> Result<Account, AppError> {
        let mut conn = self.pool.acquire().await?;
        debit_in(&mut conn, user_id, amount_minor).await
    }

    async fn find_topup_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE transaction_type = 'topup' AND idempotency_key = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn record_topup(&self, topup: NewTopup) -> Result<TopupOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Claim the session id first. A concurrent delivery of the same event
        // blocks on the unique index here and then sees the conflict.
        let claimed = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                transaction_type,
                to_user_id,
                amount_minor,
                currency,
                status,
                idempotency_key,
                meta
            )
            VALUES ('topup', $1, $2, $3, 'success', $4, $5)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(topup.user_id)
        .bind(topup.amount_minor)
        .bind(&topup.currency)
        .bind(&topup.session_id)
        .bind(topup.meta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transaction) = claimed else {
            tx.rollback().await?;
            return Ok(TopupOutcome::Duplicate);
        };

        credit_in(&mut tx, topup.user_id, topup.amount_minor).await?;

        tx.commit().await?;

        Ok(TopupOutcome::Applied(transaction))
    }

    async fn record_transfer(
        &self,
        transfer: NewTransfer,
    ) -> Result<(Account, Transaction), AppError> {
        let mut tx = self.pool.begin().await?;

        ensure_account(&mut tx, transfer.from_user_id).await?;
        ensure_account(&mut tx, transfer.to_user_id).await?;

        // Lock both rows in user_id order so opposite transfers cannot deadlock.
        sqlx::query("SELECT id FROM accounts WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE")
            .bind(vec![transfer.from_user_id, transfer.to_user_id])
            .execute(&mut *tx)
            .await?;

        let donor = match debit_in(&mut tx, transfer.from_user_id, transfer.amount_minor).await {
            Ok(account) => account,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        credit_in(&mut tx, transfer.to_user_id, transfer.amount_minor).await?;

        let transaction = insert_transaction(
            &mut tx,
            TransactionType::Transfer,
            Some(transfer.from_user_id),
            Some(transfer.to_user_id),
            transfer.amount_minor,
            &transfer.currency,
            TransactionStatus::Success,
            transfer.meta,
        )
        .await?;

        tx.commit().await?;

        Ok((donor, transaction))
    }

    async fn record_withdrawal(
        &self,
        user_id: Uuid,
        amount_minor: i64,
        currency: &str,
        meta: Value,
    ) -> Result<(Account, Transaction), AppError> {
        let mut tx = self.pool.begin().await?;

        let account = match debit_in(&mut tx, user_id, amount_minor).await {
            Ok(account) => account,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        let transaction = insert_transaction(
            &mut tx,
            TransactionType::Withdraw,
            Some(user_id),
            None,
            amount_minor,
            currency,
            TransactionStatus::Processed,
            meta,
        )
        .await?;

        tx.commit().await?;

        Ok((account, transaction))
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(transaction)
    }

    async fn earnings(&self, user_id: Uuid, recent_limit: i64) -> Result<Earnings, AppError> {
        let total_received_minor: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
            FROM transactions
            WHERE transaction_type = 'transfer'
              AND to_user_id = $1
              AND status IN ('success', 'processed')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let total_withdrawn_minor: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
            FROM transactions
            WHERE transaction_type = 'withdraw'
              AND from_user_id = $1
              AND status IN ('success', 'processed')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let recent = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE transaction_type = 'transfer' AND to_user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(recent_limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(Earnings {
            total_received_minor,
            total_withdrawn_minor,
            recent,
        })
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_user_id_by_username(&self, username: &str) -> Result<Option<Uuid>, AppError> {
        let id = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
            .bind(normalize_username(username))
            .fetch_optional(&self.pool)
            .await?;

        Ok(id)
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Unauthorized);
        }

        Ok(())
    }
}
