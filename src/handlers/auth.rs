//! Re-authentication and credential-change endpoints.

use axum::{
    Extension, Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ApiJson;
use crate::{
    app::AppState, error::AppError, models::session::SessionClaims, services::reauth_service,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReAuthAction {
    Verify,
    Refresh,
}

#[derive(Debug, Deserialize)]
pub struct ReAuthRequest {
    pub action: ReAuthAction,
}

/// `POST /auth/reauth`
///
/// - `{"action": "verify"}` -> `{recentlyAuthenticated, timeRemaining, provider, lastReAuthTime}`
/// - `{"action": "refresh"}` -> `{reAuthRequired, reAuthUrl?, provider, token?}`
///
/// Any other action is a 400.
pub async fn reauth(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(request): ApiJson<ReAuthRequest>,
) -> Result<Response, AppError> {
    let now = Utc::now();

    let response = match request.action {
        ReAuthAction::Verify => Json(reauth_service::verify(&claims, now)).into_response(),
        ReAuthAction::Refresh => {
            Json(reauth_service::refresh(&state.sessions, claims, now)?).into_response()
        }
    };

    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    pub ok: bool,
}

/// `POST /auth/password`
///
/// OAuth sessions older than the re-auth window get a 403 with `reAuthUrl`;
/// retry the same request after completing the provider sign-in.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordResponse>, AppError> {
    reauth_service::change_password(
        state.users.as_ref(),
        &claims,
        request.current_password,
        request.new_password,
        Utc::now(),
    )
    .await?;

    Ok(Json(ChangePasswordResponse { ok: true }))
}
