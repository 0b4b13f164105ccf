//! Token lifecycle: find credentials close to expiry, refresh them, and
//! invalidate the ones the provider reports as expired or revoked.
//!
//! A refresh never mutates the old row. It appends a new credential, which
//! takes over by recency. Invalidation is the only state change and it is
//! one-way.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use instapulse_core::{CollectionType, Credential, NewCollectionLog, Store, StoreError};
use instapulse_graph::{GraphClient, DEFAULT_LONG_LIVED_EXPIRES_IN_SECS};
use serde::Serialize;

use crate::CollectorError;

/// Reason recorded when the provider reports a credential as unusable.
pub const INVALIDATION_REASON: &str = "Token expired or revoked by user";

pub const DEFAULT_REFRESH_THRESHOLD_DAYS: i64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct TokenRefresher {
    graph: Arc<GraphClient>,
    store: Arc<dyn Store>,
    threshold_days: i64,
    pacing: Duration,
}

impl TokenRefresher {
    #[must_use]
    pub fn new(graph: Arc<GraphClient>, store: Arc<dyn Store>) -> Self {
        Self {
            graph,
            store,
            threshold_days: DEFAULT_REFRESH_THRESHOLD_DAYS,
            pacing: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_threshold_days(mut self, days: i64) -> Self {
        self.threshold_days = days;
        self
    }

    /// Delay between consecutive refreshes in [`Self::refresh_all_expiring`].
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Valid credentials expiring before `now + days`, most urgent first.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_expiring_within(&self, days: i64) -> Result<Vec<Credential>, StoreError> {
        let now = Utc::now();
        let threshold = TimeDelta::try_days(days)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.store.list_expiring_credentials(threshold).await
    }

    /// Re-exchanges the credential's user token, resolves a fresh token for
    /// the account's linked page and appends the result as a new credential
    /// for the same account. A linked page that is no longer listed fails the
    /// refresh without invalidating anything.
    ///
    /// Returns `true` on success. When the provider reports the token as
    /// expired or revoked, `credential` is invalidated; any other failure
    /// leaves it untouched for the next run. A `refresh` collection log entry
    /// is written either way.
    pub async fn refresh_one(&self, credential: &Credential) -> bool {
        let mut requests_made = 0;
        let result = self.try_refresh(credential, &mut requests_made).await;

        let (ok, entry) = match result {
            Ok(new_credential) => {
                tracing::info!(
                    account_id = credential.account_id,
                    credential_id = new_credential.id,
                    expires_at = %new_credential.expires_at,
                    "credential refreshed"
                );
                (
                    true,
                    NewCollectionLog::success(
                        credential.account_id,
                        CollectionType::Refresh,
                        requests_made,
                    ),
                )
            }
            Err(CollectorError::Graph(err)) if err.is_credential_revoked() => {
                tracing::warn!(
                    account_id = credential.account_id,
                    credential_id = credential.id,
                    error = %err,
                    "credential revoked by provider; invalidating"
                );
                if let Err(e) = self
                    .store
                    .invalidate_credential(credential.id, INVALIDATION_REASON)
                    .await
                {
                    tracing::error!(
                        credential_id = credential.id,
                        error = %e,
                        "failed to invalidate credential"
                    );
                }
                (
                    false,
                    NewCollectionLog::failed(
                        credential.account_id,
                        CollectionType::Refresh,
                        requests_made,
                        err.to_string(),
                    ),
                )
            }
            Err(err) => {
                tracing::warn!(
                    account_id = credential.account_id,
                    credential_id = credential.id,
                    error = %err,
                    "credential refresh failed; will retry next run"
                );
                (
                    false,
                    NewCollectionLog::failed(
                        credential.account_id,
                        CollectionType::Refresh,
                        requests_made,
                        err.to_string(),
                    ),
                )
            }
        };

        if let Err(e) = self.store.append_collection_log(&entry).await {
            tracing::error!(
                account_id = credential.account_id,
                error = %e,
                "failed to write refresh log entry"
            );
        }

        ok
    }

    /// Refreshes every credential expiring within the configured threshold,
    /// one at a time in expiry order. Never fails: errors are counted.
    pub async fn refresh_all_expiring(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        let credentials = match self.list_expiring_within(self.threshold_days).await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::error!(error = %e, "failed to list expiring credentials");
                return summary;
            }
        };

        tracing::info!(
            count = credentials.len(),
            threshold_days = self.threshold_days,
            "refreshing expiring credentials"
        );

        let sleeper = self.graph.sleeper();
        for (i, credential) in credentials.iter().enumerate() {
            if i > 0 {
                sleeper.sleep(self.pacing).await;
            }
            if self.refresh_one(credential).await {
                summary.refreshed += 1;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }

    async fn try_refresh(
        &self,
        credential: &Credential,
        requests_made: &mut i32,
    ) -> Result<Credential, CollectorError> {
        let long_lived = self
            .graph
            .exchange_for_long_lived_token(&credential.user_access_token)
            .await?;
        *requests_made += 1;

        // The new page token must belong to the page the account is linked
        // to, not whichever page the provider happens to list first.
        let linked_page = self
            .store
            .get_account(credential.account_id)
            .await?
            .and_then(|account| account.page_id);
        let page = match linked_page.as_deref() {
            Some(page_id) => {
                self.graph
                    .resolve_page_token_for(&long_lived.access_token, page_id)
                    .await?
            }
            None => {
                self.graph
                    .resolve_page_token(&long_lived.access_token)
                    .await?
            }
        };
        *requests_made += 1;

        let expires_at = expiry_from(Utc::now(), long_lived.expires_in_secs);
        let saved = self
            .store
            .save_credential(
                credential.account_id,
                &long_lived.access_token,
                &page.page_access_token,
                expires_at,
            )
            .await?;

        Ok(saved)
    }
}

/// `now + expires_in_secs`, falling back to the default long-lived lifetime
/// when the provider value is out of range.
pub(crate) fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(expires_in_secs)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or_else(|| now + TimeDelta::seconds(DEFAULT_LONG_LIVED_EXPIRES_IN_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_adds_seconds() {
        let now = Utc::now();
        assert_eq!(expiry_from(now, 3600), now + TimeDelta::hours(1));
    }

    #[test]
    fn expiry_falls_back_on_overflow() {
        let now = Utc::now();
        assert_eq!(
            expiry_from(now, i64::MAX),
            now + TimeDelta::seconds(DEFAULT_LONG_LIVED_EXPIRES_IN_SECS)
        );
    }
}
