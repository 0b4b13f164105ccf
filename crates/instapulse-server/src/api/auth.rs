//! OAuth login redirect and callback.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{ApiError, AppState};

/// Unreserved characters stay literal in a query value.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Deserialize)]
pub(super) struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Redirect, ApiError> {
    let csrf = state.oauth_states.issue().await;
    let url = state.jobs.graph().authorization_url(&csrf).map_err(|e| {
        tracing::error!(error = %e, "failed to build authorization url");
        ApiError::new(req_id.0, "internal_error", "failed to build authorization url")
    })?;

    Ok(Redirect::temporary(url.as_str()))
}

/// Always answers with a redirect to the frontend: the success page, or the
/// error page with a `reason` query parameter.
pub(super) async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let redirects = &state.redirects;

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(error, "authorization denied by provider");
        return Redirect::temporary(&with_reason(&redirects.error_url, error)).into_response();
    }

    let state_ok = match query.state.as_deref() {
        Some(csrf) => state.oauth_states.consume(csrf).await,
        None => false,
    };
    if !state_ok {
        tracing::warn!("oauth callback with unknown or expired state");
        return Redirect::temporary(&with_reason(&redirects.error_url, "invalid_state"))
            .into_response();
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return Redirect::temporary(&with_reason(&redirects.error_url, "missing_code"))
            .into_response();
    };

    match instapulse_collector::complete_authorization(
        state.jobs.graph(),
        state.jobs.store(),
        code,
    )
    .await
    {
        Ok(_) => Redirect::temporary(&redirects.success_url).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "oauth callback failed");
            Redirect::temporary(&with_reason(&redirects.error_url, "auth_failed")).into_response()
        }
    }
}

/// Appends `reason` to `error_url`, keeping any query it already carries.
fn with_reason(error_url: &str, reason: &str) -> String {
    match Url::parse(error_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("reason", reason);
            url.into()
        }
        Err(_) => {
            let separator = if error_url.contains('?') { '&' } else { '?' };
            let reason = utf8_percent_encode(reason, QUERY_VALUE);
            format!("{error_url}{separator}reason={reason}")
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header::LOCATION, Request, StatusCode};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::with_reason;
    use crate::api::{build_app, test_support, AppState};
    use crate::middleware::{AuthState, CronAuth};

    fn app(state: AppState) -> axum::Router {
        build_app(
            state,
            AuthState::from_keys("", true).expect("auth"),
            CronAuth::new(None, true).expect("cron"),
        )
    }

    async fn get_location(state: AppState, uri: &str) -> String {
        let response = app(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        response
            .headers()
            .get(LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn reason_is_encoded_for_relative_error_url() {
        assert_eq!(
            with_reason("/oauth/error", "access_denied&next=https://evil.example"),
            "/oauth/error?reason=access_denied%26next%3Dhttps%3A%2F%2Fevil.example"
        );
        assert_eq!(
            with_reason("/oauth/error?source=oauth", "invalid_state"),
            "/oauth/error?source=oauth&reason=invalid_state"
        );
    }

    #[test]
    fn reason_is_appended_to_existing_query() {
        assert_eq!(
            with_reason("https://dash.example.com/error?source=oauth", "invalid_state"),
            "https://dash.example.com/error?source=oauth&reason=invalid_state"
        );
        assert_eq!(
            with_reason("https://dash.example.com/error", "access denied"),
            "https://dash.example.com/error?reason=access+denied"
        );
    }

    #[tokio::test]
    async fn login_redirects_to_dialog_with_pending_state() {
        let state = test_support::state("https://graph.example.com");
        let states = state.oauth_states.clone();

        let location = get_location(state, "/api/auth/login").await;
        let url = reqwest::Url::parse(&location).unwrap();
        assert_eq!(url.path(), "/v18.0/dialog/oauth");

        let csrf = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(csrf.len(), 32);
        assert!(states.consume(&csrf).await);
    }

    #[tokio::test]
    async fn provider_error_is_forwarded_as_reason() {
        let location = get_location(
            test_support::state("http://127.0.0.1:1"),
            "/api/auth/callback?error=access_denied&state=whatever",
        )
        .await;
        assert_eq!(
            location,
            "https://dash.example.com/error?source=oauth&reason=access_denied"
        );
    }

    #[tokio::test]
    async fn unknown_state_is_rejected() {
        let location = get_location(
            test_support::state("http://127.0.0.1:1"),
            "/api/auth/callback?code=abc&state=not-issued",
        )
        .await;
        assert!(location.ends_with("reason=invalid_state"));
    }

    #[tokio::test]
    async fn missing_code_is_rejected_and_state_is_spent() {
        let state = test_support::state("http://127.0.0.1:1");
        let csrf = state.oauth_states.issue().await;
        let states = state.oauth_states.clone();

        let location = get_location(state, &format!("/api/auth/callback?state={csrf}")).await;
        assert!(location.ends_with("reason=missing_code"));
        assert!(!states.consume(&csrf).await);
    }

    #[tokio::test]
    async fn failed_exchange_redirects_with_auth_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v18.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "Invalid verification code format.", "code": 100}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = test_support::state(&server.uri());
        let csrf = state.oauth_states.issue().await;

        let location = get_location(
            state,
            &format!("/api/auth/callback?code=bad-code&state={csrf}"),
        )
        .await;
        assert!(location.ends_with("reason=auth_failed"));
    }
}
