use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

const AUDIENCE_SNAPSHOT_LIMIT: i64 = 3;

#[derive(Debug, Deserialize)]
pub(super) struct InsightsQuery {
    pub metric: Option<String>,
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct InsightItem {
    id: i64,
    metric_name: String,
    metric_value: f64,
    period: Option<String>,
    collected_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct AudienceItem {
    id: i64,
    metric_name: String,
    metric_value: serde_json::Value,
    collected_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct SummaryItem {
    metric_name: String,
    metric_value: f64,
    collected_at: DateTime<Utc>,
}

/// Look-back window in days: 7 by default, clamped to 1..=90.
pub(super) fn normalize_days(days: Option<i64>) -> i64 {
    days.unwrap_or(7).clamp(1, 90)
}

async fn ensure_account(
    state: &AppState,
    req_id: &RequestId,
    account_id: i64,
) -> Result<(), ApiError> {
    let account = instapulse_db::get_account(&state.pool, account_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    match account {
        Some(_) => Ok(()),
        None => Err(ApiError::new(
            req_id.0.clone(),
            "not_found",
            format!("account {account_id} not found"),
        )),
    }
}

pub(super) async fn list_account_insights(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(account_id): Path<i64>,
    Query(query): Query<InsightsQuery>,
) -> Result<Json<ApiResponse<Vec<InsightItem>>>, ApiError> {
    ensure_account(&state, &req_id, account_id).await?;

    let since = Utc::now() - TimeDelta::days(normalize_days(query.days));
    let metric = query.metric.as_deref().filter(|m| !m.is_empty());
    let rows = instapulse_db::list_insights_since(&state.pool, account_id, since, metric)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| InsightItem {
            id: row.id,
            metric_name: row.metric_name,
            metric_value: row.metric_value,
            period: row.period,
            collected_at: row.collected_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_account_audience(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<AudienceItem>>>, ApiError> {
    ensure_account(&state, &req_id, account_id).await?;

    let rows =
        instapulse_db::list_latest_audience(&state.pool, account_id, AUDIENCE_SNAPSHOT_LIMIT)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| AudienceItem {
            id: row.id,
            metric_name: row.metric_name,
            metric_value: row.metric_value,
            collected_at: row.collected_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Latest value of each metric.
pub(super) async fn account_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<SummaryItem>>>, ApiError> {
    ensure_account(&state, &req_id, account_id).await?;

    let rows = instapulse_db::latest_insight_summary(&state.pool, account_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| SummaryItem {
            metric_name: row.metric_name,
            metric_value: row.metric_value,
            collected_at: row.collected_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
