//! Graph API client: OAuth token exchange, metric fetches, the per-account
//! sliding-window rate limiter and retry with back-off.

pub mod client;
pub mod error;
pub mod insights;
pub mod oauth;
pub mod pacing;
pub mod rate_limit;
pub mod retry;
pub mod types;

pub use client::{GraphClient, GraphConfig};
pub use error::{GraphError, AUTH_ERROR_EXPIRED_OR_REVOKED};
pub use insights::{AUDIENCE_METRICS, AUDIENCE_PERIOD, DAILY_METRICS, DAILY_PERIOD};
pub use oauth::{LinkedAccount, LongLivedToken, PageToken, DEFAULT_LONG_LIVED_EXPIRES_IN_SECS};
pub use pacing::{Sleeper, TokioSleeper};
pub use rate_limit::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
pub use types::{InsightMetric, InsightValue, InsightsResponse};
