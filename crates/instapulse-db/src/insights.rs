//! Database operations for the append-only `insights` and `audience_data`
//! tables.

use chrono::{DateTime, Utc};
use instapulse_core::{NewAudienceMetric, NewInsight};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `insights` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InsightRow {
    pub id: i64,
    pub account_id: i64,
    pub metric_name: String,
    pub metric_value: f64,
    pub period: Option<String>,
    pub collected_at: DateTime<Utc>,
}

/// A row from the `audience_data` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AudienceRow {
    pub id: i64,
    pub account_id: i64,
    pub metric_name: String,
    pub metric_value: serde_json::Value,
    pub collected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Appends `insights` for one account in a single transaction.
///
/// Returns the number of rows written. An empty slice writes nothing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; nothing is committed then.
pub async fn insert_insights(
    pool: &PgPool,
    account_id: i64,
    insights: &[NewInsight],
    collected_at: DateTime<Utc>,
) -> Result<u64, DbError> {
    if insights.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut written = 0u64;
    for insight in insights {
        let result = sqlx::query(
            "INSERT INTO insights (account_id, metric_name, metric_value, period, collected_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(account_id)
        .bind(&insight.metric_name)
        .bind(insight.metric_value)
        .bind(insight.period.as_deref())
        .bind(collected_at)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }
    tx.commit().await?;

    Ok(written)
}

/// Appends structured audience metrics for one account in a single
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; nothing is committed then.
pub async fn insert_audience(
    pool: &PgPool,
    account_id: i64,
    metrics: &[NewAudienceMetric],
    collected_at: DateTime<Utc>,
) -> Result<u64, DbError> {
    if metrics.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut written = 0u64;
    for metric in metrics {
        let result = sqlx::query(
            "INSERT INTO audience_data (account_id, metric_name, metric_value, collected_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(account_id)
        .bind(&metric.metric_name)
        .bind(&metric.metric_value)
        .bind(collected_at)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }
    tx.commit().await?;

    Ok(written)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Insights for an account collected at or after `since`, newest first,
/// optionally restricted to one metric.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_insights_since(
    pool: &PgPool,
    account_id: i64,
    since: DateTime<Utc>,
    metric_name: Option<&str>,
) -> Result<Vec<InsightRow>, DbError> {
    let rows = sqlx::query_as::<_, InsightRow>(
        "SELECT id, account_id, metric_name, metric_value, period, collected_at \
         FROM insights \
         WHERE account_id = $1 \
           AND collected_at >= $2 \
           AND ($3::TEXT IS NULL OR metric_name = $3) \
         ORDER BY collected_at DESC, id DESC",
    )
    .bind(account_id)
    .bind(since)
    .bind(metric_name)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The most recent audience records for an account, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_latest_audience(
    pool: &PgPool,
    account_id: i64,
    limit: i64,
) -> Result<Vec<AudienceRow>, DbError> {
    let rows = sqlx::query_as::<_, AudienceRow>(
        "SELECT id, account_id, metric_name, metric_value, collected_at \
         FROM audience_data \
         WHERE account_id = $1 \
         ORDER BY collected_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The latest record of each metric for an account, ordered by metric name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_insight_summary(
    pool: &PgPool,
    account_id: i64,
) -> Result<Vec<InsightRow>, DbError> {
    let rows = sqlx::query_as::<_, InsightRow>(
        "SELECT DISTINCT ON (metric_name) \
                id, account_id, metric_name, metric_value, period, collected_at \
         FROM insights \
         WHERE account_id = $1 \
         ORDER BY metric_name, collected_at DESC, id DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
