//! Database operations for `collection_logs`.

use chrono::{DateTime, Utc};
use instapulse_core::NewCollectionLog;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `collection_logs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionLogRow {
    pub id: i64,
    pub account_id: i64,
    pub collection_type: String,
    pub status: String,
    pub requests_made: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Appends one audit entry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_collection_log(
    pool: &PgPool,
    entry: &NewCollectionLog,
) -> Result<CollectionLogRow, DbError> {
    let row = sqlx::query_as::<_, CollectionLogRow>(
        "INSERT INTO collection_logs \
             (account_id, collection_type, status, requests_made, error_message) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, account_id, collection_type, status, requests_made, \
                   error_message, created_at",
    )
    .bind(entry.account_id)
    .bind(entry.collection_type.as_str())
    .bind(entry.status.as_str())
    .bind(entry.requests_made)
    .bind(entry.error_message.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Most recent entries across all accounts, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_collection_logs(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CollectionLogRow>, DbError> {
    let rows = sqlx::query_as::<_, CollectionLogRow>(
        "SELECT id, account_id, collection_type, status, requests_made, \
                error_message, created_at \
         FROM collection_logs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
