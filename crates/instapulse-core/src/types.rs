//! Domain types shared by the persistence layer and the collection jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A linked analytics account, keyed internally by `id` and externally by the
/// provider's account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub external_account_id: String,
    pub username: Option<String>,
    pub page_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored credential row. Rows are appended on every successful exchange
/// or refresh; the newest valid row per account is the one used for calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: i64,
    pub account_id: i64,
    pub user_access_token: String,
    pub page_access_token: String,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("user_access_token", &"[redacted]")
            .field("page_access_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("is_valid", &self.is_valid)
            .field("invalid_reason", &self.invalid_reason)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// An account paired with the credential the jobs should use for it.
#[derive(Debug, Clone)]
pub struct AccountCredential {
    pub account: Account,
    pub credential: Credential,
}

/// A numeric metric value to append to the `insights` table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInsight {
    pub metric_name: String,
    pub metric_value: f64,
    pub period: Option<String>,
}

/// A structured (breakdown) metric value to append to `audience_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAudienceMetric {
    pub metric_name: String,
    pub metric_value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Insights,
    Audience,
    Refresh,
}

impl CollectionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionType::Insights => "insights",
            CollectionType::Audience => "audience",
            CollectionType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Success,
    Failed,
}

impl CollectionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionStatus::Success => "success",
            CollectionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one collection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollectionLog {
    pub account_id: i64,
    pub collection_type: CollectionType,
    pub status: CollectionStatus,
    pub requests_made: i32,
    pub error_message: Option<String>,
}

impl NewCollectionLog {
    #[must_use]
    pub fn success(account_id: i64, collection_type: CollectionType, requests_made: i32) -> Self {
        Self {
            account_id,
            collection_type,
            status: CollectionStatus::Success,
            requests_made,
            error_message: None,
        }
    }

    #[must_use]
    pub fn failed(
        account_id: i64,
        collection_type: CollectionType,
        requests_made: i32,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            collection_type,
            status: CollectionStatus::Failed,
            requests_made,
            error_message: Some(error_message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_redacts_tokens() {
        let credential = Credential {
            id: 1,
            account_id: 2,
            user_access_token: "EAAB-user".to_string(),
            page_access_token: "EAAB-page".to_string(),
            expires_at: Utc::now(),
            is_valid: true,
            invalid_reason: None,
            created_at: Utc::now(),
        };
        let debug = format!("{credential:?}");
        assert!(!debug.contains("EAAB"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn collection_type_serializes_snake_case() {
        let json = serde_json::to_string(&CollectionType::Audience).unwrap();
        assert_eq!(json, "\"audience\"");
        assert_eq!(CollectionType::Refresh.as_str(), "refresh");
    }

    #[test]
    fn failed_log_carries_error_message() {
        let entry = NewCollectionLog::failed(7, CollectionType::Insights, 0, "boom");
        assert_eq!(entry.status, CollectionStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("boom"));
    }
}
