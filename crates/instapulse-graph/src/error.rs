use thiserror::Error;

/// Provider error code for an access token that has expired or been revoked.
pub const AUTH_ERROR_EXPIRED_OR_REVOKED: i64 = 190;

/// Provider error codes that signal application- or account-level throttling.
pub(crate) const THROTTLING_ERROR_CODES: [i64; 4] = [4, 17, 32, 613];

/// Errors returned by the Graph API client.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The local sliding-window limiter has no budget left for this account.
    #[error("rate limit exceeded for account {account_id} (remaining: {remaining})")]
    RateLimitExceeded { account_id: String, remaining: usize },

    /// HTTP 429 or a throttling error code from the provider.
    #[error("rate limited by provider{}", retry_after_suffix(.retry_after_secs.as_ref()))]
    ProviderRateLimited { retry_after_secs: Option<u64> },

    /// HTTP 5xx from the provider.
    #[error("provider server error {status}: {message}")]
    ProviderServerError { status: u16, message: String },

    /// The credential is permanently unusable (expired or revoked).
    #[error("provider auth error (code {code}): {message}")]
    ProviderAuthError {
        code: i64,
        subcode: Option<i64>,
        message: String,
    },

    /// Any other non-2xx response.
    #[error("provider request failed with HTTP {status}: {message}")]
    ProviderRequest {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("no access token in {context} response")]
    MissingToken { context: &'static str },

    #[error("no pages are linked to this account")]
    NoPage,

    #[error("no analytics account is linked to page {page_id}")]
    NoLinkedAccount { page_id: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Wraps a failure with the OAuth step that produced it.
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<GraphError>,
    },
}

fn retry_after_suffix(retry_after_secs: Option<&u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

impl GraphError {
    /// Attaches a human-readable step description to this error.
    #[must_use]
    pub fn in_step(self, step: &'static str) -> Self {
        GraphError::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through [`GraphError::Step`] wrappers.
    #[must_use]
    pub fn root(&self) -> &GraphError {
        match self {
            GraphError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// `true` when the provider reported the credential as expired or revoked.
    #[must_use]
    pub fn is_credential_revoked(&self) -> bool {
        matches!(
            self.root(),
            GraphError::ProviderAuthError { code, .. } if *code == AUTH_ERROR_EXPIRED_OR_REVOKED
        )
    }
}
