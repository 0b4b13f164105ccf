use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the real environment so tests can
/// drive them with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let parse_num = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value = parse_num(var, default)?;
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;
    let fb_app_id = require("FB_APP_ID")?;
    let fb_app_secret = require("FB_APP_SECRET")?;

    let env = parse_environment(&or_default("INSTAPULSE_ENV", "development"))?;

    let bind_raw = or_default("INSTAPULSE_BIND_ADDR", "0.0.0.0:3000");
    let bind_addr =
        bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: "INSTAPULSE_BIND_ADDR".to_string(),
                reason: e.to_string(),
            })?;
    let log_level = or_default("INSTAPULSE_LOG_LEVEL", "info");

    let oauth_redirect_uri = or_default(
        "OAUTH_REDIRECT_URI",
        "http://localhost:3000/api/auth/callback",
    );
    let frontend_success_url = or_default("FRONTEND_SUCCESS_URL", "http://localhost:5173/success");
    let frontend_error_url = or_default("FRONTEND_ERROR_URL", "http://localhost:5173/error");
    let cron_secret = optional("CRON_SECRET");

    let db_max_connections = parse_u32("INSTAPULSE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("INSTAPULSE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_num("INSTAPULSE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let graph_base_url = or_default("INSTAPULSE_GRAPH_BASE_URL", "https://graph.facebook.com");
    let graph_api_version = or_default("INSTAPULSE_GRAPH_API_VERSION", "v18.0");
    let oauth_dialog_url = or_default("INSTAPULSE_OAUTH_DIALOG_URL", "https://www.facebook.com");
    let graph_request_timeout_secs = parse_num("INSTAPULSE_GRAPH_REQUEST_TIMEOUT_SECS", "30")?;
    let graph_user_agent = or_default(
        "INSTAPULSE_GRAPH_USER_AGENT",
        "instapulse/0.1 (insights-collector)",
    );
    let graph_max_retries = parse_u32("INSTAPULSE_GRAPH_MAX_RETRIES", "5")?;
    let graph_backoff_base_ms = parse_num("INSTAPULSE_GRAPH_BACKOFF_BASE_MS", "1000")?;

    let rate_limit_max_requests = usize::try_from(parse_num(
        "INSTAPULSE_RATE_LIMIT_MAX_REQUESTS",
        "180",
    )?)
    .map_err(|e| ConfigError::InvalidEnvVar {
        var: "INSTAPULSE_RATE_LIMIT_MAX_REQUESTS".to_string(),
        reason: e.to_string(),
    })?;
    let rate_limit_window_secs = parse_num("INSTAPULSE_RATE_LIMIT_WINDOW_SECS", "3600")?;
    let inter_account_delay_ms = parse_num("INSTAPULSE_INTER_ACCOUNT_DELAY_MS", "500")?;
    let token_refresh_threshold_days = i64::from(parse_u32(
        "INSTAPULSE_TOKEN_REFRESH_THRESHOLD_DAYS",
        "10",
    )?);
    let oauth_state_ttl_secs = parse_num("INSTAPULSE_OAUTH_STATE_TTL_SECS", "600")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        fb_app_id,
        fb_app_secret,
        oauth_redirect_uri,
        frontend_success_url,
        frontend_error_url,
        cron_secret,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        graph_base_url,
        graph_api_version,
        oauth_dialog_url,
        graph_request_timeout_secs,
        graph_user_agent,
        graph_max_retries,
        graph_backoff_base_ms,
        rate_limit_max_requests,
        rate_limit_window_secs,
        inter_account_delay_ms,
        token_refresh_threshold_days,
        oauth_state_ttl_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "INSTAPULSE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}
