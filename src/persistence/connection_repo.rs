//! User connection repository for `SQLite` persistence.
//!
//! One row per (user, provider) holds whatever tokens the user's OAuth or
//! API-key connection produced. Missing columns are filled later from the
//! keychain or the environment by the credential resolver.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{AppError, Result};

use super::db::Database;

/// Stored tokens for one user and provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConnection {
    /// Caller-chosen user identifier.
    pub user_id: String,
    /// Provider name (e.g. `gmail`).
    pub provider: String,
    /// `OAuth` access token.
    pub access_token: Option<String>,
    /// `OAuth` refresh token.
    pub refresh_token: Option<String>,
    /// Access token expiry as stored by the connector.
    pub expires_at: Option<String>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl UserConnection {
    /// New connection stamped with the current time.
    #[must_use]
    pub fn new(user_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            provider: provider.into(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Stored token fields by name, skipping absent and blank values.
    #[must_use]
    pub fn token_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("access_token", self.access_token.as_deref()),
            ("refresh_token", self.refresh_token.as_deref()),
            ("expires_at", self.expires_at.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|v| (name, v))
        })
        .collect()
    }
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ConnectionRow {
    user_id: String,
    provider: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<String>,
    updated_at: String,
}

impl ConnectionRow {
    fn into_connection(self) -> Result<UserConnection> {
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(UserConnection {
            user_id: self.user_id,
            provider: self.provider,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            updated_at,
        })
    }
}

/// Repository for user connection records.
#[derive(Debug, Clone)]
pub struct ConnectionRepo {
    db: Arc<Database>,
}

impl ConnectionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the connection for `user_id` and `provider`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find(&self, user_id: &str, provider: &str) -> Result<Option<UserConnection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(
            "SELECT user_id, provider, access_token, refresh_token, expires_at, updated_at
             FROM user_connections
             WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ConnectionRow::into_connection).transpose()
    }

    /// Insert or replace a connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert(&self, conn: &UserConnection) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_connections
                 (user_id, provider, access_token, refresh_token, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&conn.user_id)
        .bind(&conn.provider)
        .bind(&conn.access_token)
        .bind(&conn.refresh_token)
        .bind(&conn.expires_at)
        .bind(conn.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Remove a connection. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, user_id: &str, provider: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM user_connections WHERE user_id = ?1 AND provider = ?2")
                .bind(user_id)
                .bind(provider)
                .execute(self.db.as_ref())
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
