use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// API key auth settings for the read API.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from `INSTAPULSE_API_KEYS` (comma-separated bearer tokens).
    ///
    /// In development, empty/missing keys disable auth for local iteration.
    /// In non-development envs, empty/missing keys fail startup.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("INSTAPULSE_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    pub(crate) fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "INSTAPULSE_API_KEYS not set; bearer auth disabled in development environment"
                );
                return Ok(Self {
                    api_keys: Arc::new(HashSet::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "INSTAPULSE_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys.contains(token)
    }
}

/// Shared secret guarding the cron trigger endpoints.
#[derive(Clone)]
pub struct CronAuth {
    secret: Option<Arc<str>>,
}

impl std::fmt::Debug for CronAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronAuth")
            .field("enabled", &self.secret.is_some())
            .finish()
    }
}

impl CronAuth {
    /// A missing `CRON_SECRET` leaves the endpoints open in development and
    /// fails startup everywhere else.
    pub fn new(secret: Option<&str>, is_development: bool) -> anyhow::Result<Self> {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Ok(Self {
                secret: Some(Arc::from(secret)),
            }),
            None if is_development => {
                tracing::warn!("CRON_SECRET not set; cron endpoints open in development environment");
                Ok(Self { secret: None })
            }
            None => anyhow::bail!("CRON_SECRET is required outside development"),
        }
    }

    fn allows(&self, token: Option<&str>) -> bool {
        match (&self.secret, token) {
            (None, _) => true,
            (Some(secret), Some(token)) => bool::from(secret.as_bytes().ct_eq(token.as_bytes())),
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

fn unauthorized(message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MiddlewareErrorBody {
            error: MiddlewareError {
                code: "unauthorized",
                message,
            },
        }),
    )
        .into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing Bearer token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => unauthorized("missing or invalid bearer token"),
    }
}

/// Middleware comparing the bearer token against `CRON_SECRET` in constant time.
pub async fn require_cron_secret(
    State(cron): State<CronAuth>,
    req: Request,
    next: Next,
) -> Response {
    if cron.allows(extract_bearer_token(req.headers().get(AUTHORIZATION))) {
        next.run(req).await
    } else {
        tracing::warn!(path = %req.uri().path(), "rejected cron trigger with bad secret");
        unauthorized("missing or invalid cron secret")
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}
