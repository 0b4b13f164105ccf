//! Persistence interface consumed by the token lifecycle and collection jobs.
//!
//! The Postgres implementation lives in `instapulse-db`; tests provide an
//! in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Account, AccountCredential, Credential, NewAudienceMetric, NewCollectionLog, NewInsight,
};

/// Errors surfaced by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Accounts that hold a valid credential, each paired with its newest
    /// valid credential, ordered by account id.
    async fn active_accounts_with_credentials(&self)
        -> Result<Vec<AccountCredential>, StoreError>;

    async fn get_account(&self, account_id: i64) -> Result<Option<Account>, StoreError>;

    /// Creates the account for `external_account_id`, or refreshes the display
    /// name and linked page of the existing one. Must be atomic: concurrent
    /// calls for one `external_account_id` yield a single account.
    async fn upsert_account(
        &self,
        external_account_id: &str,
        username: Option<&str>,
        page_id: Option<&str>,
    ) -> Result<Account, StoreError>;

    /// Appends a new valid credential row; earlier rows are left untouched.
    async fn save_credential(
        &self,
        account_id: i64,
        user_access_token: &str,
        page_access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Credential, StoreError>;

    /// Marks a credential invalid. Invalid credentials never become valid again.
    async fn invalidate_credential(&self, credential_id: i64, reason: &str)
        -> Result<(), StoreError>;

    /// Newest valid credential per account whose expiry is before `threshold`,
    /// ordered by expiry ascending.
    async fn list_expiring_credentials(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Credential>, StoreError>;

    /// Appends numeric metric records in a single transaction.
    async fn append_insights(
        &self,
        account_id: i64,
        insights: &[NewInsight],
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Appends structured audience records in a single transaction.
    async fn append_audience(
        &self,
        account_id: i64,
        metrics: &[NewAudienceMetric],
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn append_collection_log(&self, entry: &NewCollectionLog) -> Result<(), StoreError>;
}
