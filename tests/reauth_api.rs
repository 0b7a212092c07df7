mod common;

use axum::http::StatusCode;
use chai_wallet_server::models::session::{LoginMethod, OAuthProvider};
use chrono::{Duration, Utc};
use common::TestApp;
use serde_json::json;

fn google() -> LoginMethod {
    LoginMethod::Oauth {
        provider: OAuthProvider::Google,
    }
}

#[tokio::test]
async fn verify_reports_freshness() {
    let app = TestApp::new();
    let user = app.user("creator").await;

    let token = app.token_for(user, google(), Utc::now() - Duration::minutes(1));
    let (status, body) = app
        .post("/auth/reauth", &token, json!({ "action": "verify" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recentlyAuthenticated"], true);
    assert_eq!(body["provider"], "google");
    assert!(body["timeRemaining"].as_i64().unwrap() > 0);

    let token = app.token_for(user, google(), Utc::now() - Duration::minutes(10));
    let (_, body) = app
        .post("/auth/reauth", &token, json!({ "action": "verify" }))
        .await;
    assert_eq!(body["recentlyAuthenticated"], false);
    assert_eq!(body["timeRemaining"], 0);
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let app = TestApp::new();
    let user = app.user("creator").await;

    let (status, body) = app
        .post("/auth/reauth", &app.token(user), json!({ "action": "escalate" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn reauth_requires_a_session() {
    let app = TestApp::new();
    let (status, _) = app
        .request(
            axum::http::Method::POST,
            "/auth/reauth",
            None,
            Some(json!({ "action": "verify" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_oauth_password_change_needs_reauth_then_succeeds() {
    let app = TestApp::new();
    let user = app.user("creator").await;
    let stale = app.token_for(user, google(), Utc::now() - Duration::minutes(40));

    let (status, body) = app
        .post("/auth/password", &stale, json!({ "newPassword": "chai-lover" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "reauth_required");
    assert_eq!(
        body["error"]["reAuthUrl"],
        "/api/auth/signin/google?callbackUrl=/dashboard&prompt=consent"
    );

    let (status, body) = app
        .post("/auth/reauth", &stale, json!({ "action": "refresh" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reAuthRequired"], true);
    assert!(body.get("token").is_none());

    // The provider sign-in completes and the identity provider starts a new
    // session; its first refresh records the re-auth.
    let signed_in = app.token_for(user, google(), Utc::now() - Duration::seconds(5));
    let (status, body) = app
        .post("/auth/reauth", &signed_in, json!({ "action": "refresh" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reAuthRequired"], false);
    let refreshed = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/auth/password", &refreshed, json!({ "newPassword": "chai-lover" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let stored = app.store.transactions().await;
    assert!(stored.is_empty());
}

#[tokio::test]
async fn credential_session_must_confirm_current_password() {
    let app = TestApp::new();
    let user = app.user("creator").await;
    let token = app.token_for(user, LoginMethod::Credentials, Utc::now() - Duration::days(3));

    let (status, _) = app
        .post("/auth/password", &token, json!({ "newPassword": "first-pass" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/auth/password",
            &token,
            json!({ "currentPassword": "wrong-pass", "newPassword": "second-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_credentials");

    let (status, _) = app
        .post(
            "/auth/password",
            &token,
            json!({ "currentPassword": "first-pass", "newPassword": "second-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn short_password_is_rejected() {
    let app = TestApp::new();
    let user = app.user("creator").await;

    let (status, body) = app
        .post("/auth/password", &app.token(user), json!({ "newPassword": "abc" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}
