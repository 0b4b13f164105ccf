//! Database operations for the `credentials` table.
//!
//! Rows are only ever inserted or flipped from valid to invalid. Only the
//! newest valid row per account (by `created_at`, then `id`) is handed to the
//! jobs; older valid rows stay in place as history.

use chrono::{DateTime, Utc};
use instapulse_core::{Account, AccountCredential, Credential};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `credentials` table.
#[derive(Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub id: i64,
    pub account_id: i64,
    pub user_access_token: String,
    pub page_access_token: String,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRow")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("expires_at", &self.expires_at)
            .field("is_valid", &self.is_valid)
            .field("invalid_reason", &self.invalid_reason)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl From<CredentialRow> for Credential {
    fn from(row: CredentialRow) -> Self {
        Credential {
            id: row.id,
            account_id: row.account_id,
            user_access_token: row.user_access_token,
            page_access_token: row.page_access_token,
            expires_at: row.expires_at,
            is_valid: row.is_valid,
            invalid_reason: row.invalid_reason,
            created_at: row.created_at,
        }
    }
}

/// An account joined with its newest valid credential.
#[derive(Clone, sqlx::FromRow)]
pub struct ActiveAccountRow {
    pub account_id: i64,
    pub external_account_id: String,
    pub username: Option<String>,
    pub page_id: Option<String>,
    pub account_created_at: DateTime<Utc>,
    pub account_updated_at: DateTime<Utc>,
    pub credential_id: i64,
    pub user_access_token: String,
    pub page_access_token: String,
    pub expires_at: DateTime<Utc>,
    pub credential_created_at: DateTime<Utc>,
}

impl From<ActiveAccountRow> for AccountCredential {
    fn from(row: ActiveAccountRow) -> Self {
        AccountCredential {
            account: Account {
                id: row.account_id,
                external_account_id: row.external_account_id,
                username: row.username,
                page_id: row.page_id,
                created_at: row.account_created_at,
                updated_at: row.account_updated_at,
            },
            credential: Credential {
                id: row.credential_id,
                account_id: row.account_id,
                user_access_token: row.user_access_token,
                page_access_token: row.page_access_token,
                expires_at: row.expires_at,
                is_valid: true,
                invalid_reason: None,
                created_at: row.credential_created_at,
            },
        }
    }
}

// The newest valid credential per account.
const LATEST_VALID_CREDENTIALS: &str = "\
    SELECT DISTINCT ON (account_id) \
           id, account_id, user_access_token, page_access_token, expires_at, \
           is_valid, invalid_reason, created_at \
    FROM credentials \
    WHERE is_valid = true \
    ORDER BY account_id, created_at DESC, id DESC";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Appends a new valid credential for `account_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn save_credential(
    pool: &PgPool,
    account_id: i64,
    user_access_token: &str,
    page_access_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(
        "INSERT INTO credentials (account_id, user_access_token, page_access_token, expires_at) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, account_id, user_access_token, page_access_token, expires_at, \
                   is_valid, invalid_reason, created_at",
    )
    .bind(account_id)
    .bind(user_access_token)
    .bind(page_access_token)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a credential invalid with `reason`.
///
/// Already-invalid credentials keep their original reason; the call is a
/// no-op for them.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no credential has `id`, or
/// [`DbError::Sqlx`] if a query fails.
pub async fn invalidate_credential(pool: &PgPool, id: i64, reason: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE credentials \
         SET is_valid = false, invalid_reason = $2 \
         WHERE id = $1 AND is_valid = true",
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM credentials WHERE id = $1)")
                .bind(id)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(DbError::NotFound);
        }
    }

    Ok(())
}

/// Newest valid credential per account expiring before `threshold`, most
/// urgent first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_expiring_credentials(
    pool: &PgPool,
    threshold: DateTime<Utc>,
) -> Result<Vec<CredentialRow>, DbError> {
    let sql = format!(
        "SELECT id, account_id, user_access_token, page_access_token, expires_at, \
                is_valid, invalid_reason, created_at \
         FROM ({LATEST_VALID_CREDENTIALS}) latest \
         WHERE expires_at < $1 \
         ORDER BY expires_at ASC, id ASC"
    );

    let rows = sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(threshold)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Every account holding a valid credential, paired with its newest one,
/// ordered by account id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_accounts_with_credentials(
    pool: &PgPool,
) -> Result<Vec<ActiveAccountRow>, DbError> {
    let sql = format!(
        "SELECT a.id AS account_id, a.external_account_id, a.username, a.page_id, \
                a.created_at AS account_created_at, a.updated_at AS account_updated_at, \
                c.id AS credential_id, c.user_access_token, c.page_access_token, \
                c.expires_at, c.created_at AS credential_created_at \
         FROM accounts a \
         JOIN ({LATEST_VALID_CREDENTIALS}) c ON c.account_id = a.id \
         ORDER BY a.id ASC"
    );

    let rows = sqlx::query_as::<_, ActiveAccountRow>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
