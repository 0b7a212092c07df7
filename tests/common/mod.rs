#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chai_wallet_server::{
    app::{AppState, WalletSettings, build_router},
    config::WebhookVerification,
    error::AppError,
    middleware::auth::SessionKeys,
    models::{
        session::{LoginMethod, SessionClaims},
        user::User,
        webhook::CheckoutSession,
    },
    services::{
        payment_gateway::{CheckoutRequest, PaymentGateway},
        webhook_service::{SIGNATURE_HEADER, sign_payload},
    },
    store::{LedgerStore, memory::MemoryStore},
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

pub const SESSION_SECRET: &str = "test-session-secret-at-least-32-bytes";
pub const WEBHOOK_SECRET: &str = "whsec_integration_tests";
pub const BASE_URL: &str = "https://chai.example";

/// Gateway double that answers every checkout with a fixed hosted URL.
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            id: format!("cs_test_{}", self.requests.lock().unwrap().len()),
            url: Some("https://checkout.example/pay".into()),
            amount_total: Some(request.amount_minor),
            currency: Some(request.currency.to_lowercase()),
            payment_intent: None,
            metadata: None,
        })
    }
}

#[derive(Clone)]
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub keys: Arc<SessionKeys>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_verification(WebhookVerification::signed(WEBHOOK_SECRET))
    }

    pub fn with_verification(webhook_verification: WebhookVerification) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(store.clone(), store, webhook_verification)
    }

    /// Route ledger calls through `ledger`; users and assertions stay on `store`.
    pub fn with_ledger(ledger: Arc<dyn LedgerStore>, store: Arc<MemoryStore>) -> Self {
        Self::assemble(ledger, store, WebhookVerification::signed(WEBHOOK_SECRET))
    }

    fn assemble(
        ledger: Arc<dyn LedgerStore>,
        store: Arc<MemoryStore>,
        webhook_verification: WebhookVerification,
    ) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let keys = Arc::new(SessionKeys::new(&SecretString::from(
            SESSION_SECRET.to_string(),
        )));

        let state = AppState {
            ledger,
            users: store.clone(),
            gateway: gateway.clone(),
            sessions: keys.clone(),
            settings: Arc::new(WalletSettings {
                currency: "INR".into(),
                public_base_url: BASE_URL.into(),
                webhook_verification,
            }),
        };

        Self {
            router: build_router(state),
            store,
            gateway,
            keys,
        }
    }

    pub async fn user(&self, username: &str) -> Uuid {
        self.user_with_hash(username, None).await
    }

    pub async fn user_with_hash(&self, username: &str, password_hash: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_user(User {
                id,
                username: username.into(),
                email: format!("{username}@example.com"),
                password_hash,
                created_at: Utc::now(),
            })
            .await;
        id
    }

    pub fn token(&self, user_id: Uuid) -> String {
        self.token_for(user_id, LoginMethod::Credentials, Utc::now())
    }

    pub fn token_for(&self, user_id: Uuid, login: LoginMethod, logged_in: DateTime<Utc>) -> String {
        let claims = SessionClaims::login(user_id, "user@example.com", login, true, logged_in);
        self.keys.issue(&claims).unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Deliver a webhook signed with the shared test secret.
    pub async fn deliver(&self, payload: &[u8]) -> (StatusCode, Value) {
        let signature = sign_payload(WEBHOOK_SECRET, payload, Utc::now().timestamp()).unwrap();
        self.deliver_with(payload, Some(&signature)).await
    }

    pub async fn deliver_with(&self, payload: &[u8], signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }

        self.send(builder.body(Body::from(payload.to_vec())).unwrap())
            .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn balance(&self, user_id: Uuid) -> i64 {
        let (status, body) = self.get("/funds/balance", &self.token(user_id)).await;
        assert_eq!(status, StatusCode::OK);
        body["balanceMinorUnits"].as_i64().unwrap()
    }

    /// Credit a wallet through the webhook path, as production does.
    pub async fn fund(&self, user_id: Uuid, amount_minor: i64) {
        let session_id = format!("cs_fund_{}", Uuid::new_v4().simple());
        let (status, _) = self
            .deliver(&checkout_completed(&session_id, Some(user_id), Some(amount_minor)))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

pub fn checkout_completed(session_id: &str, user_id: Option<Uuid>, amount: Option<i64>) -> Vec<u8> {
    let metadata = match user_id {
        Some(id) => json!({ "userId": id.to_string() }),
        None => json!({}),
    };

    serde_json::to_vec(&json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "amount_total": amount,
                "currency": "inr",
                "payment_intent": "pi_test_123",
                "metadata": metadata
            }
        }
    }))
    .unwrap()
}
