//! Wallet service - the balance-moving operations.
//!
//! This service handles:
//! - Top-up intents (gateway checkout, no balance change)
//! - Webhook-driven top-up completion, idempotent per checkout session
//! - Peer donations and transfers
//! - Simulated withdrawals
//! - Balance and earnings reads
//!
//! Validation happens here; atomicity is delegated to the [`LedgerStore`],
//! whose composite calls either apply completely or not at all.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::WebhookVerification;
use crate::error::AppError;
use crate::models::account::Account;
use crate::models::transaction::{Earnings, Transaction};
use crate::models::webhook::{CHECKOUT_COMPLETED, USER_ID_METADATA_KEY};
use crate::money::MIN_TOPUP_MINOR_UNITS;
use crate::services::payment_gateway::{CheckoutRequest, PaymentGateway};
use crate::services::webhook_service;
use crate::store::{LedgerStore, NewTopup, NewTransfer, TopupOutcome, UserDirectory};

/// Incoming transfers listed in the earnings summary.
pub const RECENT_TRANSFERS_LIMIT: i64 = 10;

/// Who receives a transfer.
#[derive(Debug, Clone)]
pub enum Recipient {
    Id(Uuid),
    /// Matched case-insensitively against the username index.
    Username(String),
}

/// Ledger label for a peer movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Donation,
    Transfer,
}

impl TransferKind {
    fn label(&self) -> &'static str {
        match self {
            TransferKind::Donation => "donation",
            TransferKind::Transfer => "transfer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub from_user_id: Uuid,
    pub recipient: Recipient,
    pub amount_minor: i64,
    pub message: Option<String>,
    pub kind: TransferKind,
}

/// Balance after a debit and the ledger row that recorded it.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub account: Account,
    pub transaction: Transaction,
}

/// What a webhook delivery did. Every variant is acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Wallet credited by this delivery.
    Credited { transaction_id: Uuid },
    /// Session already credited by an earlier delivery.
    AlreadyProcessed,
    /// Event kind the wallet does not act on.
    Ignored,
    /// Completed session that cannot be attributed to a wallet.
    Unattributable,
}

fn ensure_positive(amount_minor: i64) -> Result<(), AppError> {
    if amount_minor <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Start a top-up: create a hosted checkout session and return its URL.
///
/// Nothing is written to the ledger; the balance only changes when the
/// gateway later reports the session as completed.
///
/// # Errors
///
/// - `InvalidAmount`: below the 50.00 minimum
/// - `Gateway`: gateway unreachable, misconfigured, or no checkout URL
pub async fn create_topup_intent(
    gateway: &dyn PaymentGateway,
    user_id: Uuid,
    amount_minor: i64,
    currency: &str,
    public_base_url: &str,
) -> Result<String, AppError> {
    if amount_minor < MIN_TOPUP_MINOR_UNITS {
        return Err(AppError::InvalidAmount(format!(
            "Minimum top-up is {}",
            MIN_TOPUP_MINOR_UNITS / crate::money::MINOR_PER_MAJOR
        )));
    }

    let request = CheckoutRequest {
        user_id,
        amount_minor,
        currency: currency.to_string(),
        success_url: format!("{}/funds?success=1", public_base_url),
        cancel_url: format!("{}/funds?canceled=1", public_base_url),
    };

    let session = gateway.create_checkout_session(&request).await?;
    let url = session
        .url
        .ok_or_else(|| AppError::Gateway("Checkout session has no URL".to_string()))?;

    info!(
        user_id = %user_id,
        session_id = %session.id,
        amount_minor_units = amount_minor,
        "checkout session created"
    );

    Ok(url)
}

/// Complete a top-up from a gateway webhook delivery.
///
/// # Process
///
/// 1. Authenticate the raw body against the signature header
/// 2. Ignore every event kind except checkout completion
/// 3. Attribute the session to a user and amount (acknowledge, don't credit, if impossible)
/// 4. Return early if the session id is already in the ledger
/// 5. Claim the session id and credit the wallet as one store call
///
/// # Errors
///
/// - `InvalidSignature` / `MalformedPayload`: 400, the gateway should not retry
/// - `WebhookNotConfigured` / `Database`: 500, the gateway retries later
pub async fn complete_topup(
    ledger: &dyn LedgerStore,
    verification: &WebhookVerification,
    currency: &str,
    payload: &[u8],
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, AppError> {
    webhook_service::authenticate(verification, payload, signature, now)?;

    let event = webhook_service::parse_event(payload)?;
    if event.event_type != CHECKOUT_COMPLETED {
        info!(event_id = %event.id, event_type = %event.event_type, "webhook event ignored");
        return Ok(WebhookOutcome::Ignored);
    }

    let session = webhook_service::checkout_session(&event)?;

    let user_id = session
        .metadata_value(USER_ID_METADATA_KEY)
        .and_then(|raw| Uuid::parse_str(raw).ok());
    let amount_minor = session.amount_total.filter(|amount| *amount > 0);

    let (Some(user_id), Some(amount_minor)) = (user_id, amount_minor) else {
        error!(
            event_id = %event.id,
            session_id = %session.id,
            user_id = ?session.metadata_value(USER_ID_METADATA_KEY),
            amount_total = ?session.amount_total,
            "completed checkout session missing user id or amount, not credited"
        );
        return Ok(WebhookOutcome::Unattributable);
    };

    if let Some(session_currency) = session.currency.as_deref() {
        if !session_currency.eq_ignore_ascii_case(currency) {
            error!(
                session_id = %session.id,
                session_currency,
                expected_currency = currency,
                "completed checkout session in unexpected currency, not credited"
            );
            return Ok(WebhookOutcome::Unattributable);
        }
    }

    if ledger.find_topup_by_session(&session.id).await?.is_some() {
        info!(session_id = %session.id, "webhook already processed");
        return Ok(WebhookOutcome::AlreadyProcessed);
    }

    let topup = NewTopup {
        user_id,
        amount_minor,
        currency: currency.to_string(),
        session_id: session.id.clone(),
        meta: json!({
            "sessionId": session.id,
            "paymentIntent": session.payment_intent,
            "eventId": event.id,
            "timestamp": now.to_rfc3339(),
        }),
    };

    match ledger.record_topup(topup).await? {
        TopupOutcome::Applied(transaction) => {
            info!(
                user_id = %user_id,
                session_id = %session.id,
                transaction_id = %transaction.id,
                amount_minor_units = amount_minor,
                "top-up credited"
            );
            Ok(WebhookOutcome::Credited {
                transaction_id: transaction.id,
            })
        }
        TopupOutcome::Duplicate => {
            info!(session_id = %session.id, "concurrent delivery already credited session");
            Ok(WebhookOutcome::AlreadyProcessed)
        }
    }
}

async fn resolve_recipient(
    users: &dyn UserDirectory,
    recipient: &Recipient,
) -> Result<Uuid, AppError> {
    let resolved = match recipient {
        Recipient::Id(id) => users.find_user(*id).await?.map(|user| user.id),
        Recipient::Username(name) => users.find_user_id_by_username(name).await?,
    };

    resolved.ok_or(AppError::RecipientNotFound)
}

/// Move balance from one user to another.
///
/// # Validation
///
/// - Amount must be positive
/// - Recipient must exist in the user directory
/// - Sender and recipient must differ
/// - Sender must hold at least `amount_minor` at write time
///
/// # Atomicity
///
/// Debit, credit and the single `transfer` ledger row are one store call.
pub async fn transfer(
    ledger: &dyn LedgerStore,
    users: &dyn UserDirectory,
    command: TransferCommand,
    currency: &str,
) -> Result<Receipt, AppError> {
    ensure_positive(command.amount_minor)?;

    if let Recipient::Id(id) = command.recipient {
        if id == command.from_user_id {
            return Err(AppError::SelfPaymentForbidden);
        }
    }

    let to_user_id = resolve_recipient(users, &command.recipient).await?;
    if to_user_id == command.from_user_id {
        return Err(AppError::SelfPaymentForbidden);
    }

    let mut meta = Map::new();
    meta.insert("label".into(), Value::from(command.kind.label()));
    if let Some(message) = command
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
    {
        meta.insert("message".into(), Value::from(message));
    }

    let (account, transaction) = ledger
        .record_transfer(NewTransfer {
            from_user_id: command.from_user_id,
            to_user_id,
            amount_minor: command.amount_minor,
            currency: currency.to_string(),
            meta: Value::Object(meta),
        })
        .await?;

    info!(
        from_user_id = %command.from_user_id,
        to_user_id = %to_user_id,
        transaction_id = %transaction.id,
        amount_minor_units = command.amount_minor,
        kind = command.kind.label(),
        "transfer recorded"
    );

    Ok(Receipt {
        account,
        transaction,
    })
}

/// Withdraw balance. Payout is simulated, so the ledger row is terminal
/// (`processed`) as soon as it is written.
pub async fn withdraw(
    ledger: &dyn LedgerStore,
    user_id: Uuid,
    amount_minor: i64,
    currency: &str,
) -> Result<Receipt, AppError> {
    ensure_positive(amount_minor)?;

    let (account, transaction) = ledger
        .record_withdrawal(
            user_id,
            amount_minor,
            currency,
            json!({ "note": "Simulated payout processed" }),
        )
        .await?;

    info!(
        user_id = %user_id,
        transaction_id = %transaction.id,
        amount_minor_units = amount_minor,
        "withdrawal processed"
    );

    Ok(Receipt {
        account,
        transaction,
    })
}

pub async fn balance(ledger: &dyn LedgerStore, user_id: Uuid) -> Result<Account, AppError> {
    ledger.get_or_create_account(user_id).await
}

pub async fn earnings(ledger: &dyn LedgerStore, user_id: Uuid) -> Result<Earnings, AppError> {
    ledger.earnings(user_id, RECENT_TRANSFERS_LIMIT).await
}

/// A ledger row visible to `user_id`: only its sender or recipient may read it.
pub async fn transaction_for(
    ledger: &dyn LedgerStore,
    user_id: Uuid,
    transaction_id: Uuid,
) -> Result<Transaction, AppError> {
    ledger
        .find_transaction(transaction_id)
        .await?
        .filter(|transaction| transaction.involves(user_id))
        .ok_or(AppError::TransactionNotFound)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::models::transaction::{TransactionStatus, TransactionType};
    use crate::models::user::User;
    use crate::models::webhook::CheckoutSession;
    use crate::services::webhook_service::sign_payload;
    use crate::store::memory::MemoryStore;

    const SECRET: &str = "whsec_wallet_tests";

    #[derive(Default)]
    struct RecordingGateway {
        requests: Mutex<Vec<CheckoutRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn create_checkout_session(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, AppError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(CheckoutSession {
                id: "cs_test_intent".into(),
                url: Some("https://checkout.example/cs_test_intent".into()),
                amount_total: Some(request.amount_minor),
                currency: Some(request.currency.to_lowercase()),
                payment_intent: None,
                metadata: None,
            })
        }
    }

    async fn user(store: &MemoryStore, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert_user(User {
                id,
                username: username.into(),
                email: format!("{username}@example.com"),
                password_hash: None,
                created_at: Utc::now(),
            })
            .await;
        id
    }

    fn completed_event(session_id: &str, user_id: Option<Uuid>, amount: Option<i64>) -> Vec<u8> {
        let metadata = match user_id {
            Some(id) => json!({ "userId": id.to_string() }),
            None => json!({}),
        };
        serde_json::to_vec(&json!({
            "id": format!("evt_{session_id}"),
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": session_id,
                "amount_total": amount,
                "currency": "inr",
                "payment_intent": "pi_test",
                "metadata": metadata
            }}
        }))
        .unwrap()
    }

    async fn deliver(store: &MemoryStore, body: &[u8]) -> Result<WebhookOutcome, AppError> {
        let now = Utc::now();
        let header = sign_payload(SECRET, body, now.timestamp()).unwrap();
        complete_topup(
            store,
            &WebhookVerification::signed(SECRET),
            "INR",
            body,
            Some(&header),
            now,
        )
        .await
    }

    fn donation(from: Uuid, to: Uuid, amount_minor: i64) -> TransferCommand {
        TransferCommand {
            from_user_id: from,
            recipient: Recipient::Id(to),
            amount_minor,
            message: None,
            kind: TransferKind::Donation,
        }
    }

    #[tokio::test]
    async fn topup_minimum_is_fifty() {
        let gateway = RecordingGateway::default();
        let user_id = Uuid::new_v4();

        let err = create_topup_intent(&gateway, user_id, 4_999, "INR", "https://chai.example")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
        assert!(gateway.requests.lock().unwrap().is_empty());

        let url = create_topup_intent(&gateway, user_id, 5_000, "INR", "https://chai.example")
            .await
            .unwrap();
        assert_eq!(url, "https://checkout.example/cs_test_intent");

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests[0].amount_minor, 5_000);
        assert_eq!(requests[0].user_id, user_id);
        assert_eq!(requests[0].success_url, "https://chai.example/funds?success=1");
    }

    #[tokio::test]
    async fn webhook_replay_credits_once() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let body = completed_event("cs_replay", Some(user_id), Some(10_000));

        let first = deliver(&store, &body).await.unwrap();
        assert!(matches!(first, WebhookOutcome::Credited { .. }));

        let second = deliver(&store, &body).await.unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);

        assert_eq!(balance(&store, user_id).await.unwrap().balance_minor, 10_000);
        let topups: Vec<_> = store
            .transactions()
            .await
            .into_iter()
            .filter(|t| t.transaction_type == TransactionType::Topup)
            .collect();
        assert_eq!(topups.len(), 1);
        assert_eq!(topups[0].meta["sessionId"], "cs_replay");
        assert_eq!(topups[0].status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn webhook_without_attribution_is_acknowledged_without_credit() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();

        let outcome = deliver(&store, &completed_event("cs_no_user", None, Some(10_000)))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Unattributable);

        let outcome = deliver(&store, &completed_event("cs_no_amount", Some(user_id), None))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Unattributable);

        assert!(store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn other_event_kinds_are_ignored() {
        let store = MemoryStore::new();
        let body = serde_json::to_vec(&json!({
            "id": "evt_pi",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1" } }
        }))
        .unwrap();

        assert_eq!(deliver(&store, &body).await.unwrap(), WebhookOutcome::Ignored);
        assert!(store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn forged_webhook_is_rejected_before_parsing() {
        let store = MemoryStore::new();
        let body = completed_event("cs_forged", Some(Uuid::new_v4()), Some(10_000));
        let header = sign_payload("whsec_attacker", &body, Utc::now().timestamp()).unwrap();

        let err = complete_topup(
            &store,
            &WebhookVerification::signed(SECRET),
            "INR",
            &body,
            Some(&header),
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidSignature));
        assert!(store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn self_payment_is_forbidden_regardless_of_balance() {
        let store = MemoryStore::new();
        let a = user(&store, "asha").await;
        store.credit(a, 1_000_000).await.unwrap();

        let err = transfer(&store, &store, donation(a, a, 100), "INR")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SelfPaymentForbidden));

        let by_name = TransferCommand {
            recipient: Recipient::Username("ASHA".into()),
            ..donation(a, a, 100)
        };
        let err = transfer(&store, &store, by_name, "INR").await.unwrap_err();
        assert!(matches!(err, AppError::SelfPaymentForbidden));
    }

    #[tokio::test]
    async fn exact_balance_can_be_spent() {
        let store = MemoryStore::new();
        let donor = user(&store, "donor").await;
        let creator = user(&store, "creator").await;
        store.credit(donor, 10_000).await.unwrap();

        let err = transfer(&store, &store, donation(donor, creator, 10_001), "INR")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance));
        assert_eq!(balance(&store, donor).await.unwrap().balance_minor, 10_000);
        assert_eq!(balance(&store, creator).await.unwrap().balance_minor, 0);

        let receipt = transfer(&store, &store, donation(donor, creator, 10_000), "INR")
            .await
            .unwrap();
        assert_eq!(receipt.account.balance_minor, 0);
        assert_eq!(balance(&store, creator).await.unwrap().balance_minor, 10_000);
    }

    #[tokio::test]
    async fn transfer_conserves_balance_and_records_one_row() {
        let store = MemoryStore::new();
        let donor = user(&store, "donor").await;
        let creator = user(&store, "creator").await;
        store.credit(donor, 7_500).await.unwrap();

        let command = TransferCommand {
            recipient: Recipient::Username("Creator".into()),
            message: Some("  nice work ".into()),
            ..donation(donor, creator, 2_500)
        };
        let receipt = transfer(&store, &store, command, "INR").await.unwrap();

        assert_eq!(receipt.account.balance_minor, 5_000);
        assert_eq!(balance(&store, creator).await.unwrap().balance_minor, 2_500);

        let rows = store.transactions().await;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, receipt.transaction.id);
        assert_eq!(row.transaction_type, TransactionType::Transfer);
        assert_eq!(row.from_user_id, Some(donor));
        assert_eq!(row.to_user_id, Some(creator));
        assert_eq!(row.amount_minor, 2_500);
        assert_eq!(row.message(), Some("nice work"));
        assert_eq!(row.meta["label"], "donation");
    }

    #[tokio::test]
    async fn unknown_recipients_are_rejected() {
        let store = MemoryStore::new();
        let donor = user(&store, "donor").await;
        store.credit(donor, 5_000).await.unwrap();

        let by_name = TransferCommand {
            recipient: Recipient::Username("nobody".into()),
            ..donation(donor, donor, 100)
        };
        assert!(matches!(
            transfer(&store, &store, by_name, "INR").await.unwrap_err(),
            AppError::RecipientNotFound
        ));

        let by_id = donation(donor, Uuid::new_v4(), 100);
        assert!(matches!(
            transfer(&store, &store, by_id, "INR").await.unwrap_err(),
            AppError::RecipientNotFound
        ));
        assert_eq!(balance(&store, donor).await.unwrap().balance_minor, 5_000);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let store = MemoryStore::new();
        let donor = user(&store, "donor").await;
        let creator = user(&store, "creator").await;

        for amount in [0, -100] {
            assert!(matches!(
                transfer(&store, &store, donation(donor, creator, amount), "INR")
                    .await
                    .unwrap_err(),
                AppError::InvalidAmount(_)
            ));
            assert!(matches!(
                withdraw(&store, donor, amount, "INR").await.unwrap_err(),
                AppError::InvalidAmount(_)
            ));
        }
    }

    #[tokio::test]
    async fn topup_donate_withdraw_scenario() {
        let store = MemoryStore::new();
        let x = user(&store, "x").await;
        let y = user(&store, "y").await;

        deliver(&store, &completed_event("cs_scenario", Some(x), Some(10_000)))
            .await
            .unwrap();
        assert_eq!(balance(&store, x).await.unwrap().balance_minor, 10_000);

        let command = TransferCommand {
            message: Some("nice work".into()),
            ..donation(x, y, 3_000)
        };
        let receipt = transfer(&store, &store, command, "INR").await.unwrap();
        assert_eq!(receipt.account.balance_minor, 7_000);
        assert_eq!(receipt.transaction.message(), Some("nice work"));
        assert_eq!(balance(&store, y).await.unwrap().balance_minor, 3_000);

        let receipt = withdraw(&store, y, 3_000, "INR").await.unwrap();
        assert_eq!(receipt.account.balance_minor, 0);
        assert_eq!(receipt.transaction.status, TransactionStatus::Processed);
        assert_eq!(receipt.transaction.transaction_type, TransactionType::Withdraw);

        let summary = earnings(&store, y).await.unwrap();
        assert_eq!(summary.total_received_minor, 3_000);
        assert_eq!(summary.total_withdrawn_minor, 3_000);
        assert_eq!(summary.recent.len(), 1);
    }

    #[tokio::test]
    async fn transactions_are_private_to_their_parties() {
        let store = MemoryStore::new();
        let donor = user(&store, "donor").await;
        let creator = user(&store, "creator").await;
        store.credit(donor, 1_000).await.unwrap();

        let receipt = transfer(&store, &store, donation(donor, creator, 500), "INR")
            .await
            .unwrap();
        let id = receipt.transaction.id;

        assert!(transaction_for(&store, donor, id).await.is_ok());
        assert!(transaction_for(&store, creator, id).await.is_ok());
        assert!(matches!(
            transaction_for(&store, Uuid::new_v4(), id).await.unwrap_err(),
            AppError::TransactionNotFound
        ));
    }
}
