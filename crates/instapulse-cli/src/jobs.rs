//! Job and OAuth command handlers.
//!
//! The limiter lives for the lifetime of one invocation, so a CLI run does not
//! see requests recorded by a running server.

use std::sync::Arc;
use std::time::Duration;

use instapulse_collector::{JobRunner, JobSettings};
use instapulse_core::AppConfig;
use instapulse_graph::{GraphClient, GraphConfig, RateLimiter};

fn graph_client(config: &AppConfig) -> anyhow::Result<GraphClient> {
    GraphClient::new(GraphConfig::from_app_config(config))
        .map_err(|e| anyhow::anyhow!("failed to build Graph client: {e}"))
}

pub(crate) fn build_runner(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<JobRunner> {
    let limiter = RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    );
    Ok(JobRunner::new(
        Arc::new(graph_client(config)?),
        Arc::new(instapulse_db::PgStore::new(pool)),
        Arc::new(limiter),
        JobSettings::from_app_config(config),
    ))
}

/// Prints `{"refreshed": n, "failed": n}`.
pub(crate) async fn run_refresh_tokens(runner: &JobRunner) -> anyhow::Result<()> {
    let summary = runner.run_token_refresh_job().await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub(crate) async fn run_collect_insights(runner: &JobRunner, audience: bool) -> anyhow::Result<()> {
    let summary = runner.run_insights_collection_job(audience).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "some accounts failed; see collection logs");
    }
    Ok(())
}

/// Authorization dialog URL for `state`, or for a fresh random state.
pub(crate) fn authorization_url(config: &AppConfig, state: Option<&str>) -> anyhow::Result<String> {
    let state = state.map_or_else(random_state, ToOwned::to_owned);
    let url = graph_client(config)?.authorization_url(&state)?;
    Ok(url.into())
}

fn random_state() -> String {
    format!("{:032x}", rand::random::<u128>())
}
