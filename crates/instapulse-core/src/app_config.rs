use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub fb_app_id: String,
    pub fb_app_secret: String,
    pub oauth_redirect_uri: String,
    pub frontend_success_url: String,
    pub frontend_error_url: String,
    pub cron_secret: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub graph_base_url: String,
    pub graph_api_version: String,
    pub oauth_dialog_url: String,
    pub graph_request_timeout_secs: u64,
    pub graph_user_agent: String,
    pub graph_max_retries: u32,
    pub graph_backoff_base_ms: u64,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
    pub inter_account_delay_ms: u64,
    pub token_refresh_threshold_days: i64,
    pub oauth_state_ttl_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("fb_app_id", &self.fb_app_id)
            .field("fb_app_secret", &"[redacted]")
            .field("oauth_redirect_uri", &self.oauth_redirect_uri)
            .field("frontend_success_url", &self.frontend_success_url)
            .field("frontend_error_url", &self.frontend_error_url)
            .field(
                "cron_secret",
                &self.cron_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("graph_base_url", &self.graph_base_url)
            .field("graph_api_version", &self.graph_api_version)
            .field("oauth_dialog_url", &self.oauth_dialog_url)
            .field(
                "graph_request_timeout_secs",
                &self.graph_request_timeout_secs,
            )
            .field("graph_user_agent", &self.graph_user_agent)
            .field("graph_max_retries", &self.graph_max_retries)
            .field("graph_backoff_base_ms", &self.graph_backoff_base_ms)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("inter_account_delay_ms", &self.inter_account_delay_ms)
            .field(
                "token_refresh_threshold_days",
                &self.token_refresh_threshold_days,
            )
            .field("oauth_state_ttl_secs", &self.oauth_state_ttl_secs)
            .finish()
    }
}
