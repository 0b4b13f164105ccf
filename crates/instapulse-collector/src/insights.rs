//! Insights collection job.
//!
//! Walks every account holding a valid credential in account-id order. For
//! each one: defer if the limiter has no budget, fetch daily metrics (and the
//! audience breakdown when asked), persist them, and write one collection log
//! entry. A fixed delay separates consecutive accounts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use instapulse_core::{
    AccountCredential, CollectionType, NewAudienceMetric, NewCollectionLog, NewInsight, Store,
};
use instapulse_graph::{GraphClient, InsightsResponse, RateLimiter};
use serde::Serialize;

use crate::CollectorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub success: usize,
    pub failed: usize,
    /// Accounts skipped because the rate limiter had no budget left.
    pub deferred: usize,
}

pub struct InsightsCollector {
    graph: Arc<GraphClient>,
    store: Arc<dyn Store>,
    limiter: Arc<RateLimiter>,
    pacing: Duration,
}

impl InsightsCollector {
    #[must_use]
    pub fn new(graph: Arc<GraphClient>, store: Arc<dyn Store>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            graph,
            store,
            limiter,
            pacing: Duration::from_millis(500),
        }
    }

    /// Delay between consecutive accounts.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Collects metrics for every active account. Never fails: per-account
    /// errors are logged and counted.
    pub async fn run(&self, collect_audience: bool) -> CollectionSummary {
        let mut summary = CollectionSummary::default();

        let accounts = match self.store.active_accounts_with_credentials().await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!(error = %e, "failed to load active accounts");
                return summary;
            }
        };

        tracing::info!(
            accounts = accounts.len(),
            collect_audience,
            "starting insights collection"
        );

        let collection_type = if collect_audience {
            CollectionType::Audience
        } else {
            CollectionType::Insights
        };
        let sleeper = self.graph.sleeper();

        for (i, pair) in accounts.iter().enumerate() {
            if i > 0 {
                sleeper.sleep(self.pacing).await;
            }

            let external_id = pair.account.external_account_id.as_str();
            if !self.limiter.can_make_request(external_id) {
                tracing::info!(
                    account_id = pair.account.id,
                    reset_in_secs = self.limiter.reset_in(external_id).as_secs(),
                    "rate limit budget exhausted; deferring account"
                );
                summary.deferred += 1;
                continue;
            }

            let mut requests_made = 0;
            let entry = match self
                .collect_account(pair, collect_audience, &mut requests_made)
                .await
            {
                Ok(records) => {
                    tracing::info!(
                        account_id = pair.account.id,
                        records,
                        requests_made,
                        "collected insights"
                    );
                    summary.success += 1;
                    NewCollectionLog::success(pair.account.id, collection_type, requests_made)
                }
                Err(e) => {
                    tracing::error!(
                        account_id = pair.account.id,
                        error = %e,
                        "insights collection failed"
                    );
                    summary.failed += 1;
                    NewCollectionLog::failed(
                        pair.account.id,
                        collection_type,
                        requests_made,
                        e.to_string(),
                    )
                }
            };

            if let Err(e) = self.store.append_collection_log(&entry).await {
                tracing::error!(
                    account_id = pair.account.id,
                    error = %e,
                    "failed to write collection log entry"
                );
            }
        }

        summary
    }

    /// Returns the number of records written.
    async fn collect_account(
        &self,
        pair: &AccountCredential,
        collect_audience: bool,
        requests_made: &mut i32,
    ) -> Result<usize, CollectorError> {
        let external_id = pair.account.external_account_id.as_str();
        let token = pair.credential.page_access_token.as_str();
        let collected_at = Utc::now();

        let daily = self
            .graph
            .fetch_daily_insights(&self.limiter, external_id, token)
            .await?;
        *requests_made += 1;

        let insights = to_insights(&daily);
        self.store
            .append_insights(pair.account.id, &insights, collected_at)
            .await?;
        let mut records = insights.len();

        if collect_audience {
            let audience = self
                .graph
                .fetch_audience_insights(&self.limiter, external_id, token)
                .await?;
            *requests_made += 1;

            let metrics = to_audience(&audience);
            self.store
                .append_audience(pair.account.id, &metrics, collected_at)
                .await?;
            records += metrics.len();
        }

        Ok(records)
    }
}

fn to_insights(response: &InsightsResponse) -> Vec<NewInsight> {
    response
        .data
        .iter()
        .map(|metric| NewInsight {
            metric_name: metric.name.clone(),
            metric_value: metric.numeric_value(),
            period: metric.period.clone(),
        })
        .collect()
}

fn to_audience(response: &InsightsResponse) -> Vec<NewAudienceMetric> {
    response
        .data
        .iter()
        .map(|metric| NewAudienceMetric {
            metric_name: metric.name.clone(),
            metric_value: metric.first_value(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_metrics_map_to_numeric_records() {
        let response: InsightsResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"name": "reach", "period": "day", "values": [{"value": 12}]},
                {"name": "impressions", "period": "day", "values": [{"value": null}]}
            ]
        }))
        .unwrap();

        let records = to_insights(&response);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metric_name, "reach");
        assert!((records[0].metric_value - 12.0).abs() < f64::EPSILON);
        assert_eq!(records[0].period.as_deref(), Some("day"));
        assert!(records[1].metric_value.abs() < f64::EPSILON);
    }

    #[test]
    fn audience_metrics_keep_structure() {
        let response: InsightsResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"name": "audience_gender_age", "period": "lifetime", "values": [{"value": {"F.25-34": 40}}]}
            ]
        }))
        .unwrap();

        let metrics = to_audience(&response);
        assert_eq!(metrics[0].metric_name, "audience_gender_age");
        assert_eq!(metrics[0].metric_value, serde_json::json!({"F.25-34": 40}));
    }
}
