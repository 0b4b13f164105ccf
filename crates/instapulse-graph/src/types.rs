//! Serde shapes of the Graph API responses this crate consumes.
//!
//! Only the fields the collector reads are modelled; everything else in the
//! provider payloads is ignored.

use serde::Deserialize;
use serde_json::Value;

/// `GET /oauth/access_token` (both the code exchange and `fb_exchange_token`).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// `GET /me/accounts` and `GET /{business_id}/owned_pages`.
#[derive(Debug, Deserialize)]
pub(crate) struct PageList {
    #[serde(default)]
    pub data: Vec<Page>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Page {
    pub id: String,
    pub access_token: Option<String>,
}

/// `GET /me/businesses`.
#[derive(Debug, Deserialize)]
pub(crate) struct BusinessList {
    #[serde(default)]
    pub data: Vec<Business>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Business {
    pub id: String,
}

/// `GET /{page_id}?fields=instagram_business_account{id,username}`.
#[derive(Debug, Deserialize)]
pub(crate) struct PageLinkResponse {
    pub instagram_business_account: Option<LinkedAccountRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkedAccountRef {
    pub id: String,
    pub username: Option<String>,
}

/// Provider error envelope: `{"error": {"message", "type", "code", "error_subcode"}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProviderErrorBody {
    pub message: Option<String>,
    pub code: Option<i64>,
    pub error_subcode: Option<i64>,
}

/// `GET /{account_id}/insights`.
#[derive(Debug, Clone, Deserialize)]
pub struct InsightsResponse {
    #[serde(default)]
    pub data: Vec<InsightMetric>,
}

/// One metric series in an insights response.
#[derive(Debug, Clone, Deserialize)]
pub struct InsightMetric {
    pub name: String,
    pub period: Option<String>,
    #[serde(default)]
    pub values: Vec<InsightValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsightValue {
    #[serde(default)]
    pub value: Value,
    pub end_time: Option<String>,
}

impl InsightMetric {
    /// The first data point's raw value, or `Null` when the series is empty.
    #[must_use]
    pub fn first_value(&self) -> Value {
        self.values
            .first()
            .map_or(Value::Null, |point| point.value.clone())
    }

    /// The first data point coerced to a number. Missing, non-numeric and
    /// non-finite values become `0.0`.
    #[must_use]
    pub fn numeric_value(&self) -> f64 {
        let n = match self.values.first().map(|point| &point.value) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        };
        if n.is_finite() {
            n
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(values: Value) -> InsightMetric {
        serde_json::from_value(serde_json::json!({
            "name": "reach",
            "period": "day",
            "values": values,
        }))
        .unwrap()
    }

    #[test]
    fn numeric_value_reads_first_point() {
        let m = metric(serde_json::json!([
            {"value": 42, "end_time": "2024-01-02T08:00:00+0000"},
            {"value": 7}
        ]));
        assert!((m.numeric_value() - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn numeric_value_coerces_missing_and_non_numeric_to_zero() {
        assert!(metric(serde_json::json!([])).numeric_value().abs() < f64::EPSILON);
        assert!(metric(serde_json::json!([{}])).numeric_value().abs() < f64::EPSILON);
        assert!(metric(serde_json::json!([{"value": {"US": 3}}]))
            .numeric_value()
            .abs()
            < f64::EPSILON);
        assert!(metric(serde_json::json!([{"value": "n/a"}]))
            .numeric_value()
            .abs()
            < f64::EPSILON);
    }

    #[test]
    fn numeric_value_parses_numeric_strings() {
        let m = metric(serde_json::json!([{"value": " 12.5 "}]));
        assert!((m.numeric_value() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn first_value_keeps_structure() {
        let m = metric(serde_json::json!([{"value": {"Austin, Texas": 120}}]));
        assert_eq!(m.first_value(), serde_json::json!({"Austin, Texas": 120}));
        assert_eq!(metric(serde_json::json!([])).first_value(), Value::Null);
    }

    #[test]
    fn insights_response_tolerates_missing_data() {
        let parsed: InsightsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.data.is_empty());
    }
}
