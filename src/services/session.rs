//! Session validation — token to identity.
//!
//! Login, logout, and token minting belong to the accounts subsystem;
//! this side only resolves an existing token to its user, once, at
//! handshake time. The identity is then immutable for the connection's
//! lifetime.

use sqlx::{PgPool, Row};

use crate::message::UserView;

/// User row resolved from a session token.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Private contact address; never serialized.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    /// Platform administrator flag; never serialized.
    pub is_admin: bool,
}

impl SessionUser {
    /// Public projection embedded in broadcasts. Email and the admin flag
    /// stay server-side.
    #[must_use]
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Validate a session token and return the associated user.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT u.id, u.name, u.email, u.avatar_url, u.is_admin
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser {
        id: r.get("id"),
        name: r.get("name"),
        email: r.get("email"),
        avatar_url: r.get("avatar_url"),
        is_admin: r.get("is_admin"),
    }))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
