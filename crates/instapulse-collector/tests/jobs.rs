mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use instapulse_collector::{CollectionSummary, JobRunner, JobSettings, RefreshSummary};
use instapulse_graph::RateLimiter;
use support::{graph_client, MemoryStore, RecordingSleeper};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn runner_drives_both_jobs_with_configured_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v18.0/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "renewed",
            "expires_in": 5_184_000
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v18.0/me/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "page-1", "access_token": "page-renewed"}]
        })))
        .mount(&server)
        .await;
    for id in ["a", "b"] {
        Mock::given(method("GET"))
            .and(path(format!("/v18.0/{id}/insights")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"name": "reach", "period": "day", "values": [{"value": 5}]}]
            })))
            .mount(&server)
            .await;
    }

    let store = MemoryStore::new();
    let now = Utc::now();
    store.seed_account("a", "page-a", now + TimeDelta::days(20));
    store.seed_account("b", "page-b", now + TimeDelta::days(25));

    let sleeper = Arc::new(RecordingSleeper::default());
    let runner = JobRunner::new(
        graph_client(&server.uri(), Arc::clone(&sleeper)),
        store.clone(),
        Arc::new(RateLimiter::default()),
        JobSettings {
            inter_account_delay: Duration::from_millis(250),
            refresh_threshold_days: 21,
        },
    );

    // Only "a" expires inside the 21-day threshold.
    assert_eq!(
        runner.run_token_refresh_job().await,
        RefreshSummary {
            refreshed: 1,
            failed: 0
        }
    );
    assert!(sleeper.delays().is_empty());

    assert_eq!(
        runner.run_insights_collection_job(false).await,
        CollectionSummary {
            success: 2,
            failed: 0,
            deferred: 0
        }
    );
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(250)]);
    assert_eq!(store.logs().len(), 3);

    // Collection used the refreshed page token for "a".
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .any(|r| r.url.path() == "/v18.0/a/insights"
            && r.url.query().unwrap_or_default().contains("access_token=page-renewed")));
}

#[test]
fn default_settings_pace_half_a_second() {
    let settings = JobSettings::default();
    assert_eq!(settings.inter_account_delay, Duration::from_millis(500));
    assert_eq!(settings.refresh_threshold_days, 10);
}
