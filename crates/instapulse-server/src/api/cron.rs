//! Trigger endpoints for an external scheduler. Jobs never fail as a whole,
//! so these always answer 200 with the run's tallies plus `completed: true`.
//! (`success` is already a tally name in the collection summary.)

use axum::{extract::State, Extension, Json};
use instapulse_collector::{CollectionSummary, RefreshSummary};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct JobOutcome<T: Serialize> {
    #[serde(flatten)]
    summary: T,
    completed: bool,
}

fn respond<T: Serialize>(req_id: RequestId, summary: T) -> Json<ApiResponse<JobOutcome<T>>> {
    Json(ApiResponse {
        data: JobOutcome {
            summary,
            completed: true,
        },
        meta: ResponseMeta::new(req_id.0),
    })
}

pub(super) async fn refresh_tokens(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<JobOutcome<RefreshSummary>>> {
    let summary = state.jobs.run_token_refresh_job().await;
    respond(req_id, summary)
}

pub(super) async fn collect_insights(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<JobOutcome<CollectionSummary>>> {
    let summary = state.jobs.run_insights_collection_job(false).await;
    respond(req_id, summary)
}

pub(super) async fn collect_audience(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<JobOutcome<CollectionSummary>>> {
    let summary = state.jobs.run_insights_collection_job(true).await;
    respond(req_id, summary)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::api::{build_app, test_support};
    use crate::middleware::{AuthState, CronAuth};

    fn app() -> axum::Router {
        build_app(
            test_support::state("http://127.0.0.1:1"),
            AuthState::from_keys("reader", false).expect("auth"),
            CronAuth::new(Some("cron-secret"), false).expect("cron"),
        )
    }

    #[test]
    fn outcome_flattens_counts_next_to_completed() {
        let outcome = JobOutcome {
            summary: RefreshSummary {
                refreshed: 3,
                failed: 1,
            },
            completed: true,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"refreshed": 3, "failed": 1, "completed": true})
        );
    }

    #[tokio::test]
    async fn trigger_without_secret_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cron/collect-insights")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn trigger_with_api_key_instead_of_secret_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cron/refresh-tokens")
                    .header("authorization", "Bearer reader")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn trigger_reports_tallies_even_when_storage_is_down() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cron/collect-audience")
                    .header("authorization", "Bearer cron-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["data"],
            serde_json::json!({"success": 0, "failed": 0, "deferred": 0, "completed": true})
        );
    }
}
