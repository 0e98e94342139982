//! `SQLite` schema bootstrap logic.
//!
//! Uses `CREATE TABLE IF NOT EXISTS`, so it is safe to re-run on every
//! startup.

use sqlx::SqlitePool;

use crate::Result;

/// Create the `user_connections` table idempotently.
///
/// # Errors
///
/// Returns `AppError::Db` if the DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS user_connections (
    user_id         TEXT NOT NULL,
    provider        TEXT NOT NULL,
    access_token    TEXT,
    refresh_token   TEXT,
    expires_at      TEXT,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (user_id, provider)
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
