//! Signed session claims issued by the identity provider.
//!
//! The claims are a fixed structure rather than an open bag: who the user is,
//! how they logged in, and the two timestamps the re-authentication gate
//! reads.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime of an issued session token, in days.
pub const SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum LoginMethod {
    /// Username/email and password.
    Credentials,
    /// Federated login through an external provider.
    Oauth { provider: OAuthProvider },
}

impl LoginMethod {
    pub fn provider_name(&self) -> &'static str {
        match self {
            LoginMethod::Credentials => "credentials",
            LoginMethod::Oauth { provider } => provider.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    pub login: LoginMethod,
    pub profile_complete: bool,

    /// Set at every successful login.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_auth_time: DateTime<Utc>,

    /// Set at login and refreshed by each completed federated re-auth.
    /// Never earlier than `last_auth_time`.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_re_auth_time: DateTime<Utc>,

    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Claims for a fresh login by any method.
    pub fn login(
        user_id: Uuid,
        email: impl Into<String>,
        login: LoginMethod,
        profile_complete: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id,
            email: email.into(),
            login,
            profile_complete,
            last_auth_time: now,
            last_re_auth_time: now,
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
        }
    }

    /// Claims after the user completes a federated re-auth flow.
    pub fn reauthenticated(mut self, now: DateTime<Utc>) -> Self {
        self.last_re_auth_time = now.max(self.last_auth_time);
        self.iat = now.timestamp();
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.sub
    }
}
