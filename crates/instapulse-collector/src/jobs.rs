//! Job entrypoints for an external trigger (cron endpoint or CLI).
//!
//! Each job kind holds its own async mutex, so overlapping triggers of the
//! same job queue up instead of interleaving accounts.

use std::sync::Arc;
use std::time::Duration;

use instapulse_core::{AppConfig, Store};
use instapulse_graph::{GraphClient, RateLimiter};
use tokio::sync::Mutex;

use crate::insights::{CollectionSummary, InsightsCollector};
use crate::tokens::{RefreshSummary, TokenRefresher, DEFAULT_REFRESH_THRESHOLD_DAYS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    pub inter_account_delay: Duration,
    pub refresh_threshold_days: i64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            inter_account_delay: Duration::from_millis(500),
            refresh_threshold_days: DEFAULT_REFRESH_THRESHOLD_DAYS,
        }
    }
}

impl JobSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            inter_account_delay: Duration::from_millis(config.inter_account_delay_ms),
            refresh_threshold_days: config.token_refresh_threshold_days,
        }
    }
}

pub struct JobRunner {
    graph: Arc<GraphClient>,
    store: Arc<dyn Store>,
    refresher: TokenRefresher,
    collector: InsightsCollector,
    refresh_lock: Mutex<()>,
    collect_lock: Mutex<()>,
}

impl JobRunner {
    #[must_use]
    pub fn new(
        graph: Arc<GraphClient>,
        store: Arc<dyn Store>,
        limiter: Arc<RateLimiter>,
        settings: JobSettings,
    ) -> Self {
        let refresher = TokenRefresher::new(Arc::clone(&graph), Arc::clone(&store))
            .with_threshold_days(settings.refresh_threshold_days)
            .with_pacing(settings.inter_account_delay);
        let collector = InsightsCollector::new(Arc::clone(&graph), Arc::clone(&store), limiter)
            .with_pacing(settings.inter_account_delay);

        Self {
            graph,
            store,
            refresher,
            collector,
            refresh_lock: Mutex::new(()),
            collect_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &GraphClient {
        &self.graph
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub async fn run_token_refresh_job(&self) -> RefreshSummary {
        let _guard = self.refresh_lock.lock().await;
        tracing::info!("token refresh job started");
        let summary = self.refresher.refresh_all_expiring().await;
        tracing::info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "token refresh job finished"
        );
        summary
    }

    pub async fn run_insights_collection_job(&self, collect_audience: bool) -> CollectionSummary {
        let _guard = self.collect_lock.lock().await;
        tracing::info!(collect_audience, "insights collection job started");
        let summary = self.collector.run(collect_audience).await;
        tracing::info!(
            success = summary.success,
            failed = summary.failed,
            deferred = summary.deferred,
            "insights collection job finished"
        );
        summary
    }
}
