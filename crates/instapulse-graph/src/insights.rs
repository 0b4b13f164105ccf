//! Metric fetches gated by the per-account [`RateLimiter`].

use crate::client::GraphClient;
use crate::error::GraphError;
use crate::rate_limit::RateLimiter;
use crate::types::InsightsResponse;

/// Daily account metrics collected on every run.
pub const DAILY_METRICS: [&str; 4] = ["impressions", "reach", "accounts_engaged", "follower_count"];
pub const DAILY_PERIOD: &str = "day";

/// Audience breakdowns, collected only when requested.
pub const AUDIENCE_METRICS: [&str; 3] = ["audience_city", "audience_country", "audience_gender_age"];
pub const AUDIENCE_PERIOD: &str = "lifetime";

impl GraphClient {
    /// Fetches `metrics` for `account_id` over `period`.
    ///
    /// Refuses up front when the limiter has no budget left for the account.
    /// The call itself goes through the retry policy, and one request is
    /// recorded against the account once it succeeds.
    ///
    /// # Errors
    ///
    /// - [`GraphError::RateLimitExceeded`] when the limiter denies the account.
    /// - Any provider, transport or deserialization error left after retries.
    pub async fn fetch_insights(
        &self,
        limiter: &RateLimiter,
        account_id: &str,
        access_token: &str,
        metrics: &[&str],
        period: &str,
    ) -> Result<InsightsResponse, GraphError> {
        if !limiter.can_make_request(account_id) {
            return Err(GraphError::RateLimitExceeded {
                account_id: account_id.to_owned(),
                remaining: limiter.remaining(account_id),
            });
        }

        let metric = metrics.join(",");
        let url = self.build_url(
            &format!("{account_id}/insights"),
            &[
                ("metric", &metric),
                ("period", period),
                ("access_token", access_token),
            ],
        )?;

        let response = self.get_json_with_retry(&url, "insights").await?;
        limiter.record_request(account_id);
        Ok(response)
    }

    /// [`DAILY_METRICS`] for the `day` period.
    ///
    /// # Errors
    ///
    /// See [`GraphClient::fetch_insights`].
    pub async fn fetch_daily_insights(
        &self,
        limiter: &RateLimiter,
        account_id: &str,
        access_token: &str,
    ) -> Result<InsightsResponse, GraphError> {
        self.fetch_insights(limiter, account_id, access_token, &DAILY_METRICS, DAILY_PERIOD)
            .await
    }

    /// [`AUDIENCE_METRICS`] for the `lifetime` period.
    ///
    /// # Errors
    ///
    /// See [`GraphClient::fetch_insights`].
    pub async fn fetch_audience_insights(
        &self,
        limiter: &RateLimiter,
        account_id: &str,
        access_token: &str,
    ) -> Result<InsightsResponse, GraphError> {
        self.fetch_insights(
            limiter,
            account_id,
            access_token,
            &AUDIENCE_METRICS,
            AUDIENCE_PERIOD,
        )
        .await
    }
}
