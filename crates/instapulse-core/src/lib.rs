pub mod app_config;
pub mod config;
pub mod store;
pub mod types;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use store::{Store, StoreError};
pub use types::{
    Account, AccountCredential, CollectionStatus, CollectionType, Credential, NewAudienceMetric,
    NewCollectionLog, NewInsight,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
