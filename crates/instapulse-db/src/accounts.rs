//! Database operations for the `accounts` table.

use chrono::{DateTime, Utc};
use instapulse_core::Account;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub external_account_id: String,
    pub username: Option<String>,
    pub page_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            external_account_id: row.external_account_id,
            username: row.username,
            page_id: row.page_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Returns an account by internal id, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_account(pool: &PgPool, id: i64) -> Result<Option<AccountRow>, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, external_account_id, username, page_id, created_at, updated_at \
         FROM accounts \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Creates the account for `external_account_id`, or overwrites the display
/// name and linked page of the existing one, in a single statement.
///
/// Concurrent calls for the same `external_account_id` all succeed and
/// return the same row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_account(
    pool: &PgPool,
    external_account_id: &str,
    username: Option<&str>,
    page_id: Option<&str>,
) -> Result<AccountRow, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "INSERT INTO accounts (external_account_id, username, page_id) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (external_account_id) DO UPDATE \
         SET username = EXCLUDED.username, page_id = EXCLUDED.page_id, updated_at = NOW() \
         RETURNING id, external_account_id, username, page_id, created_at, updated_at",
    )
    .bind(external_account_id)
    .bind(username)
    .bind(page_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
