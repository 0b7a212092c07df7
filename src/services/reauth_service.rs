//! Re-authentication gate for credential changes.
//!
//! A federated login proves control of the external account, not intent to
//! change a local password. Password set/change from an OAuth session is
//! therefore only allowed shortly after the user re-asserts their identity
//! with the provider; password sessions prove intent with the current
//! password instead.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::middleware::auth::SessionKeys;
use crate::models::session::{LoginMethod, OAuthProvider, SessionClaims};
use crate::store::UserDirectory;

/// Window after login in which the session counts as fresh.
pub const FRESH_WINDOW_MINUTES: i64 = 5;

/// Window after a federated re-auth in which credential changes are allowed.
pub const REAUTH_WINDOW_MINUTES: i64 = 30;

/// A refresh within this many seconds of login is the tail of a completed
/// federated sign-in.
pub const REFRESH_GRACE_SECONDS: i64 = 60;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReAuthState {
    /// Within the fresh window of the last login.
    Fresh,
    /// Past the fresh window, but re-authenticated within the re-auth window.
    ReAuthenticated,
    Stale,
}

pub fn classify(claims: &SessionClaims, now: DateTime<Utc>) -> ReAuthState {
    if now - claims.last_auth_time < Duration::minutes(FRESH_WINDOW_MINUTES) {
        ReAuthState::Fresh
    } else if now - claims.last_re_auth_time < Duration::minutes(REAUTH_WINDOW_MINUTES) {
        ReAuthState::ReAuthenticated
    } else {
        ReAuthState::Stale
    }
}

/// Where the client sends the user to re-assert their identity.
/// Credential sessions re-authenticate with their password, so have none.
pub fn reauth_url(login: &LoginMethod) -> Option<String> {
    match login {
        LoginMethod::Credentials => None,
        LoginMethod::Oauth {
            provider: OAuthProvider::Google,
        } => Some("/api/auth/signin/google?callbackUrl=/dashboard&prompt=consent".to_string()),
        LoginMethod::Oauth {
            provider: OAuthProvider::Github,
        } => Some("/api/auth/signin/github?callbackUrl=/dashboard".to_string()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub recently_authenticated: bool,
    /// Seconds left in the fresh window, zero once it has passed.
    pub time_remaining: i64,
    pub provider: &'static str,
    pub last_re_auth_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub re_auth_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_auth_url: Option<String>,
    pub provider: &'static str,
    /// Reissued session with `lastReAuthTime` moved to now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// "Are you still fresh" poll.
pub fn verify(claims: &SessionClaims, now: DateTime<Utc>) -> VerifyResponse {
    let remaining = Duration::minutes(FRESH_WINDOW_MINUTES) - (now - claims.last_re_auth_time);

    VerifyResponse {
        recently_authenticated: remaining > Duration::zero(),
        time_remaining: remaining.num_seconds().max(0),
        provider: claims.login.provider_name(),
        last_re_auth_time: claims.last_re_auth_time,
    }
}

/// Record a completed federated re-auth, or point the client at one.
pub fn refresh(
    keys: &SessionKeys,
    claims: SessionClaims,
    now: DateTime<Utc>,
) -> Result<RefreshResponse, AppError> {
    let provider = claims.login.provider_name();

    if now - claims.last_auth_time < Duration::seconds(REFRESH_GRACE_SECONDS) {
        let claims = claims.reauthenticated(now);
        let token = keys.issue(&claims)?;
        info!(user_id = %claims.user_id(), provider, "re-authentication recorded");

        return Ok(RefreshResponse {
            re_auth_required: false,
            re_auth_url: None,
            provider,
            token: Some(token),
        });
    }

    Ok(RefreshResponse {
        re_auth_required: true,
        re_auth_url: reauth_url(&claims.login),
        provider,
        token: None,
    })
}

async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
            .map_err(|e| AppError::Internal(format!("Salt encoding failed: {}", e)))?;

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("Argon2 hashing error: {}", e);
                AppError::Internal("Password hashing failed".to_string())
            })
    })
    .await
    .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_password(password: String, stored_hash: String) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash).map_err(|e| {
            error!("Argon2 hash parsing error: {}", e);
            AppError::Internal("Stored password hash is unreadable".to_string())
        })?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AppError::InvalidCredentials)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

/// Set or change the caller's password, behind the re-auth gate.
///
/// # Gate
///
/// - Credential session with a password already set: `current_password`
///   must match it
/// - OAuth session: the last re-auth must be under 30 minutes old, otherwise
///   `ReAuthRequired` carrying the provider's sign-in URL
///
/// # Errors
///
/// - `InvalidRequest`: new password shorter than 6 characters
/// - `InvalidCredentials`: current password missing or wrong
/// - `ReAuthRequired`: stale OAuth session
/// - `Unauthorized`: session user no longer exists
pub async fn change_password(
    users: &dyn UserDirectory,
    claims: &SessionClaims,
    current_password: Option<String>,
    new_password: String,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let user = users
        .find_user(claims.user_id())
        .await?
        .ok_or(AppError::Unauthorized)?;

    match claims.login {
        LoginMethod::Credentials => {
            if let Some(stored_hash) = user.password_hash {
                let current = current_password.ok_or(AppError::InvalidCredentials)?;
                verify_password(current, stored_hash).await.inspect_err(|_| {
                    warn!(user_id = %user.id, "password change with wrong current password");
                })?;
            }
        }
        LoginMethod::Oauth { .. } => {
            if classify(claims, now) == ReAuthState::Stale {
                info!(user_id = %user.id, "password change requires re-authentication");
                return Err(AppError::ReAuthRequired {
                    re_auth_url: reauth_url(&claims.login),
                });
            }
        }
    }

    let password_hash = hash_password(new_password).await?;
    users.set_password_hash(user.id, &password_hash).await?;

    info!(user_id = %user.id, provider = claims.login.provider_name(), "password updated");
    Ok(())
}
