//! [`Store`] backed by Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use instapulse_core::{
    Account, AccountCredential, Credential, NewAudienceMetric, NewCollectionLog, NewInsight, Store,
    StoreError,
};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn active_accounts_with_credentials(
        &self,
    ) -> Result<Vec<AccountCredential>, StoreError> {
        let rows = crate::list_active_accounts_with_credentials(&self.pool).await?;
        Ok(rows.into_iter().map(AccountCredential::from).collect())
    }

    async fn get_account(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let row = crate::get_account(&self.pool, account_id).await?;
        Ok(row.map(Account::from))
    }

    async fn upsert_account(
        &self,
        external_account_id: &str,
        username: Option<&str>,
        page_id: Option<&str>,
    ) -> Result<Account, StoreError> {
        let row = crate::upsert_account(&self.pool, external_account_id, username, page_id).await?;
        Ok(row.into())
    }

    async fn save_credential(
        &self,
        account_id: i64,
        user_access_token: &str,
        page_access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Credential, StoreError> {
        let row = crate::save_credential(
            &self.pool,
            account_id,
            user_access_token,
            page_access_token,
            expires_at,
        )
        .await?;
        Ok(row.into())
    }

    async fn invalidate_credential(
        &self,
        credential_id: i64,
        reason: &str,
    ) -> Result<(), StoreError> {
        crate::invalidate_credential(&self.pool, credential_id, reason).await?;
        Ok(())
    }

    async fn list_expiring_credentials(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Credential>, StoreError> {
        let rows = crate::list_expiring_credentials(&self.pool, threshold).await?;
        Ok(rows.into_iter().map(Credential::from).collect())
    }

    async fn append_insights(
        &self,
        account_id: i64,
        insights: &[NewInsight],
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        crate::insert_insights(&self.pool, account_id, insights, collected_at).await?;
        Ok(())
    }

    async fn append_audience(
        &self,
        account_id: i64,
        metrics: &[NewAudienceMetric],
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        crate::insert_audience(&self.pool, account_id, metrics, collected_at).await?;
        Ok(())
    }

    async fn append_collection_log(&self, entry: &NewCollectionLog) -> Result<(), StoreError> {
        crate::insert_collection_log(&self.pool, entry).await?;
        Ok(())
    }
}
