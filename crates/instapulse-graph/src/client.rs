//! HTTP client for the Graph API.
//!
//! Every outbound call goes through [`GraphClient::get_json`], which performs
//! exactly one request and turns a failed response into a typed
//! [`GraphError`] by looking at the status code, the `Retry-After` header and
//! the provider error envelope. Retries are layered on top by
//! [`GraphClient::get_json_with_retry`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use instapulse_core::AppConfig;

use crate::error::{GraphError, AUTH_ERROR_EXPIRED_OR_REVOKED, THROTTLING_ERROR_CODES};
use crate::pacing::{Sleeper, TokioSleeper};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::ErrorEnvelope;

const DEFAULT_API_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_API_VERSION: &str = "v18.0";
const DEFAULT_DIALOG_BASE_URL: &str = "https://www.facebook.com";
const DEFAULT_USER_AGENT: &str = "instapulse/0.1 (insights-collector)";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Settings for [`GraphClient`].
#[derive(Clone)]
pub struct GraphConfig {
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub api_version: String,
    pub dialog_base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
    /// Used for retry back-off and by callers that pace their own loops.
    pub sleeper: Arc<dyn Sleeper>,
}

impl GraphConfig {
    /// Production defaults for everything except the app credentials.
    #[must_use]
    pub fn new(app_id: &str, app_secret: &str, redirect_uri: &str) -> Self {
        Self {
            app_id: app_id.to_owned(),
            app_secret: app_secret.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            dialog_base_url: DEFAULT_DIALOG_BASE_URL.to_owned(),
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            app_id: config.fb_app_id.clone(),
            app_secret: config.fb_app_secret.clone(),
            redirect_uri: config.oauth_redirect_uri.clone(),
            api_base_url: config.graph_base_url.clone(),
            api_version: config.graph_api_version.clone(),
            dialog_base_url: config.oauth_dialog_url.clone(),
            timeout_secs: config.graph_request_timeout_secs,
            user_agent: config.graph_user_agent.clone(),
            retry: RetryPolicy {
                max_retries: config.graph_max_retries,
                base_delay: Duration::from_millis(config.graph_backoff_base_ms),
                ..RetryPolicy::default()
            },
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Points both the API and the dialog at `base_url` (for wiremock tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.clone_into(&mut self.api_base_url);
        base_url.clone_into(&mut self.dialog_base_url);
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .field("api_base_url", &self.api_base_url)
            .field("api_version", &self.api_version)
            .field("dialog_base_url", &self.dialog_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Client for the Graph API.
///
/// Holds no per-account state; the sliding-window limiter is owned by the
/// caller and passed into the fetches that need it.
pub struct GraphClient {
    client: Client,
    api_root: Url,
    dialog_root: Url,
    app_id: String,
    app_secret: String,
    redirect_uri: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl GraphClient {
    /// # Errors
    ///
    /// Returns [`GraphError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`GraphError::InvalidUrl`] if either base URL
    /// does not parse.
    pub fn new(config: GraphConfig) -> Result<Self, GraphError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .build()?;

        let api_root = parse_root(&format!(
            "{}/{}",
            config.api_base_url.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        ))?;
        let dialog_root = parse_root(&format!(
            "{}/{}",
            config.dialog_base_url.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        ))?;

        Ok(Self {
            client,
            api_root,
            dialog_root,
            app_id: config.app_id,
            app_secret: config.app_secret,
            redirect_uri: config.redirect_uri,
            retry: config.retry,
            sleeper: config.sleeper,
        })
    }

    /// The sleeper shared with retry back-off, for callers pacing their loops.
    #[must_use]
    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    pub(crate) fn app_id(&self) -> &str {
        &self.app_id
    }

    pub(crate) fn app_secret(&self) -> &str {
        &self.app_secret
    }

    pub(crate) fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub(crate) fn dialog_url(&self) -> Result<Url, GraphError> {
        join(&self.dialog_root, "dialog/oauth")
    }

    /// Builds `{api_root}/{path}?{params}` with percent-encoded query pairs.
    pub(crate) fn build_url(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, GraphError> {
        let mut url = join(&self.api_root, path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Sends one GET request and parses a 2xx body as `T`.
    ///
    /// `context` names the endpoint in errors; the URL itself is never used
    /// because its query carries access tokens.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Http`] on transport failure.
    /// - [`GraphError::ProviderRateLimited`], [`GraphError::ProviderAuthError`],
    ///   [`GraphError::ProviderServerError`] or [`GraphError::ProviderRequest`]
    ///   for a non-2xx response, see [`classify_failure`].
    /// - [`GraphError::Deserialize`] if a 2xx body does not match `T`.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        context: &str,
    ) -> Result<T, GraphError> {
        // Transport errors would otherwise echo the URL, tokens included.
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status();
        let retry_after_secs = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !status.is_success() {
            return Err(classify_failure(status, retry_after_secs, &body));
        }

        serde_json::from_str(&body).map_err(|e| GraphError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// [`Self::get_json`] wrapped in the client's [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// See [`with_retry`].
    pub(crate) async fn get_json_with_retry<T: DeserializeOwned>(
        &self,
        url: &Url,
        context: &str,
    ) -> Result<T, GraphError> {
        with_retry(&self.retry, self.sleeper.as_ref(), || {
            let url = url.clone();
            async move { self.get_json(&url, context).await }
        })
        .await
    }
}

fn parse_root(raw: &str) -> Result<Url, GraphError> {
    // A trailing slash makes `Url::join` append to the path instead of
    // replacing its last segment.
    let normalised = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| GraphError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

fn join(root: &Url, path: &str) -> Result<Url, GraphError> {
    root.join(path.trim_start_matches('/'))
        .map_err(|e| GraphError::InvalidUrl {
            url: path.to_owned(),
            reason: e.to_string(),
        })
}

/// Reads `Retry-After` as delta-seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Maps a non-2xx response to the error taxonomy.
///
/// Order matters: throttling (HTTP 429 or codes 4/17/32/613) wins over
/// everything, then the expired/revoked code 190, then 5xx.
pub(crate) fn classify_failure(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> GraphError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let code = detail.as_ref().and_then(|d| d.code);
    let subcode = detail.as_ref().and_then(|d| d.error_subcode);
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| fallback_message(status, body));

    if status == StatusCode::TOO_MANY_REQUESTS
        || code.is_some_and(|c| THROTTLING_ERROR_CODES.contains(&c))
    {
        return GraphError::ProviderRateLimited { retry_after_secs };
    }
    if code == Some(AUTH_ERROR_EXPIRED_OR_REVOKED) {
        return GraphError::ProviderAuthError {
            code: AUTH_ERROR_EXPIRED_OR_REVOKED,
            subcode,
            message,
        };
    }
    if status.is_server_error() {
        return GraphError::ProviderServerError {
            status: status.as_u16(),
            message,
        };
    }
    GraphError::ProviderRequest {
        status: status.as_u16(),
        code,
        message,
    }
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_owned();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
