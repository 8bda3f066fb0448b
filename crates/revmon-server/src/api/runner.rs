use crate::api::{
    deserialize_flag, deserialize_optional_flag, error_response, parse_optional_body,
    storage_error_response, success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use revmon_alert::RunRequest;
use revmon_common::types::non_empty;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const RUNNER_SECRET_HEADER: &str = "x-alerts-runner-secret";

/// Trigger parameters, accepted both as query string and as JSON body.
/// A field set in the body wins over the same field in the query.
#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_flag")]
    dry_run: Option<bool>,
}

impl RunParams {
    fn merge(body: RunParams, query: RunParams) -> RunRequest {
        RunRequest {
            rule_id: non_empty(body.rule_id.as_deref()).or(non_empty(query.rule_id.as_deref())),
            dry_run: body.dry_run.or(query.dry_run).unwrap_or(false),
            now: None,
        }
    }
}

/// Digests are compared so neither content nor length leaks through timing.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.as_slice().ct_eq(expected.as_slice()).into()
}

fn is_authorized_runner(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let provided = headers
        .get(RUNNER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    provided.is_some_and(|p| secrets_match(p, expected))
}

async fn execute(state: &AppState, trace_id: &str, request: RunRequest) -> Response {
    match state.runner.run(&request).await {
        Ok(report) => success_response(StatusCode::OK, trace_id, report),
        Err(e) => {
            tracing::error!(error = %e, "Alert run failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "run_failed",
                "Alert run failed",
            )
        }
    }
}

/// Machine-to-machine trigger used by external cron jobs.
pub async fn run_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RunParams>,
    body: Bytes,
) -> impl IntoResponse {
    let secret = state.config.runner_secret();
    if !is_authorized_runner(&headers, secret.as_deref()) {
        return error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "Unauthorized",
        );
    }

    let params: RunParams = match parse_optional_body(&body) {
        Ok(p) => p,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };

    execute(&state, &trace_id, RunParams::merge(params, query)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRuleBody {
    #[serde(default, deserialize_with = "deserialize_flag")]
    dry_run: bool,
}

/// Runs one rule on demand, regardless of its `enabled` flag.
pub async fn run_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let params: RunRuleBody = match parse_optional_body(&body) {
        Ok(p) => p,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };

    match state.store.get_rule(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Alert rule not found",
            )
        }
        Err(e) => return storage_error_response(&trace_id, &e),
    }

    let request = RunRequest {
        rule_id: Some(id),
        dry_run: params.dry_run,
        now: None,
    };
    execute(&state, &trace_id, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(secret: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(secret) = secret {
            map.insert(RUNNER_SECRET_HEADER, HeaderValue::from_str(secret).unwrap());
        }
        map
    }

    #[test]
    fn runner_secret_must_match() {
        assert!(is_authorized_runner(&headers(Some("s3cret")), Some("s3cret")));
        assert!(is_authorized_runner(&headers(Some(" s3cret ")), Some("s3cret")));
        assert!(!is_authorized_runner(&headers(Some("wrong")), Some("s3cret")));
        assert!(!is_authorized_runner(&headers(None), Some("s3cret")));
    }

    #[test]
    fn secret_prefixes_and_extensions_do_not_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cre", "s3cret"));
        assert!(!secrets_match("s3cret-and-more", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }

    fn params(rule_id: Option<&str>, dry_run: Option<bool>) -> RunParams {
        RunParams {
            rule_id: rule_id.map(str::to_string),
            dry_run,
        }
    }

    #[test]
    fn body_fields_win_over_query() {
        let request = RunParams::merge(params(None, Some(false)), params(Some("r1"), Some(true)));
        assert!(!request.dry_run);
        assert_eq!(request.rule_id.as_deref(), Some("r1"));

        let request = RunParams::merge(params(Some("r2"), None), params(Some("r1"), Some(true)));
        assert!(request.dry_run);
        assert_eq!(request.rule_id.as_deref(), Some("r2"));

        let request = RunParams::merge(params(Some("  "), None), params(None, None));
        assert!(!request.dry_run);
        assert!(request.rule_id.is_none());
    }

    #[test]
    fn dry_run_flag_keeps_absence() {
        let body: RunParams = serde_json::from_str(r#"{"rule_id": "r1"}"#).unwrap();
        assert_eq!(body.dry_run, None);
        let body: RunParams = serde_json::from_str(r#"{"dry_run": null}"#).unwrap();
        assert_eq!(body.dry_run, None);
        let body: RunParams = serde_json::from_str(r#"{"dry_run": "yes"}"#).unwrap();
        assert_eq!(body.dry_run, Some(true));
        let body: RunParams = serde_json::from_str(r#"{"dry_run": 0}"#).unwrap();
        assert_eq!(body.dry_run, Some(false));
    }

    #[test]
    fn unset_secret_rejects_everyone() {
        assert!(!is_authorized_runner(&headers(Some("anything")), None));
        assert!(!is_authorized_runner(&headers(None), None));
    }
}
