//! Identity record as seen by the wallet.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table, owned by the identity provider. The wallet
/// resolves recipients through the lowercase `username` index and the
/// credential-change path writes `password_hash`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Always stored lowercase.
    pub username: String,

    pub email: String,

    /// Argon2 PHC string. `None` for accounts created through OAuth only.
    pub password_hash: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Canonical form of a username for index lookups.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}
