mod api;
mod middleware;
mod oauth_state;

use std::sync::Arc;
use std::time::Duration;

use instapulse_collector::{JobRunner, JobSettings};
use instapulse_core::Environment;
use instapulse_graph::{GraphClient, GraphConfig, RateLimiter};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState, FrontendRedirects},
    middleware::{AuthState, CronAuth},
    oauth_state::OAuthStateStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = instapulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = instapulse_db::PoolConfig::from_app_config(&config);
    let pool = instapulse_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = instapulse_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let graph = GraphClient::new(GraphConfig::from_app_config(&config))?;
    let limiter = RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    );
    let jobs = JobRunner::new(
        Arc::new(graph),
        Arc::new(instapulse_db::PgStore::new(pool.clone())),
        Arc::new(limiter),
        JobSettings::from_app_config(&config),
    );

    let is_development = matches!(config.env, Environment::Development);
    let auth = AuthState::from_env(is_development)?;
    let cron = CronAuth::new(config.cron_secret.as_deref(), is_development)?;

    let state = AppState {
        pool,
        jobs: Arc::new(jobs),
        oauth_states: OAuthStateStore::new(Duration::from_secs(config.oauth_state_ttl_secs)),
        redirects: Arc::new(FrontendRedirects {
            success_url: config.frontend_success_url.clone(),
            error_url: config.frontend_error_url.clone(),
        }),
    };
    let app = build_app(state, auth, cron);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "instapulse server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
