//! Token lifecycle, insights collection and the OAuth callback flow.
//!
//! Both jobs walk accounts one at a time. Per-account failures are recorded
//! in the collection log and never abort a run; entrypoints return tallies
//! instead of errors.

pub mod insights;
pub mod jobs;
pub mod oauth_flow;
pub mod tokens;

use instapulse_core::StoreError;
use instapulse_graph::GraphError;
use thiserror::Error;

pub use insights::{CollectionSummary, InsightsCollector};
pub use jobs::{JobRunner, JobSettings};
pub use oauth_flow::complete_authorization;
pub use tokens::{RefreshSummary, TokenRefresher, INVALIDATION_REASON};

/// Failure while processing one account.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
