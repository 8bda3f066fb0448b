pub mod alerts;
pub mod insights;
pub mod runner;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use revmon_ai::InsightError;
use revmon_storage::StorageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Envelope wrapping every API response.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "not_found" => 1004,
        "conflict" => 1005,
        "invalid_transition" => 1006,
        "insight_not_found" => 1201,
        "llm_not_configured" => 1202,
        "llm_error" => 1203,
        "invalid_insight" => 1204,
        "run_failed" => 1301,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

pub(crate) fn storage_error_response(trace_id: &str, err: &StorageError) -> Response {
    match err {
        StorageError::Invalid(msg) => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", msg)
        }
        StorageError::InvalidTransition { .. } => error_response(
            StatusCode::CONFLICT,
            trace_id,
            "invalid_transition",
            &err.to_string(),
        ),
        StorageError::NotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "Storage operation failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub(crate) fn insight_error_response(trace_id: &str, err: &InsightError) -> Response {
    match err {
        InsightError::NotFound(_) => error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "Alert instance not found",
        ),
        InsightError::NotConfigured => error_response(
            StatusCode::CONFLICT,
            trace_id,
            "llm_not_configured",
            "No LLM provider configured",
        ),
        InsightError::InvalidInput(msg) => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", msg)
        }
        InsightError::Storage(e) => storage_error_response(trace_id, e),
        InsightError::Http(_) | InsightError::Llm(_) => {
            tracing::error!(error = %err, "Insight generation failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                trace_id,
                "llm_error",
                &err.to_string(),
            )
        }
        InsightError::InvalidOutput(_) => error_response(
            StatusCode::BAD_GATEWAY,
            trace_id,
            "invalid_insight",
            &err.to_string(),
        ),
    }
}

/// Parses an optional JSON body. An empty body or `null` yields `T::default()`.
pub(crate) fn parse_optional_body<T>(body: &[u8]) -> Result<T, String>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice::<Option<T>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|e| format!("Invalid request body: {e}"))
}

pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|e| format!("Invalid request body: {e}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Number(n) => n == 1,
            Flag::Text(s) => matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
        }
    }
}

/// Accepts `true`/`false`, `1`/`0` and the strings `1 true yes on`
/// (any case) as true. Anything else is false.
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.is_some_and(Flag::is_set))
}

/// Like [`deserialize_flag`], but keeps an absent or `null` value as `None`.
pub(crate) fn deserialize_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.map(Flag::is_set))
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    metrics_provider: String,
    scheduler_enabled: bool,
    insight_configured: bool,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            metrics_provider: state.config.metrics.provider.to_string(),
            scheduler_enabled: state.config.scheduler.enabled,
            insight_configured: state.insights.is_configured(),
        },
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/internal/alerts/run", post(runner::run_alerts))
        .route(
            "/v1/alerts/rules",
            get(alerts::list_rules).post(alerts::create_rule),
        )
        .route(
            "/v1/alerts/rules/{id}",
            get(alerts::get_rule).put(alerts::update_rule),
        )
        .route("/v1/alerts/rules/{id}/run", post(runner::run_rule))
        .route("/v1/alerts/instances", get(alerts::list_instances))
        .route(
            "/v1/alerts/instances/{id}",
            patch(alerts::update_instance_status),
        )
        .route(
            "/v1/alerts/instances/{id}/insight",
            get(insights::get_insight).post(insights::generate_insight),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Body {
        #[serde(default, deserialize_with = "deserialize_flag")]
        force: bool,
    }

    #[test]
    fn flag_accepts_bools_numbers_and_truthy_strings() {
        for (raw, expected) in [
            (r#"{"force": true}"#, true),
            (r#"{"force": false}"#, false),
            (r#"{"force": 1}"#, true),
            (r#"{"force": "YES"}"#, true),
            (r#"{"force": "on"}"#, true),
            (r#"{"force": "nope"}"#, false),
            (r#"{"force": null}"#, false),
            (r#"{}"#, false),
        ] {
            let body: Body = parse_optional_body(raw.as_bytes()).unwrap();
            assert_eq!(body.force, expected, "{raw}");
        }
    }

    #[test]
    fn empty_and_null_bodies_use_defaults() {
        let body: Body = parse_optional_body(b"").unwrap();
        assert!(!body.force);
        let body: Body = parse_optional_body(b"null").unwrap();
        assert!(!body.force);
        assert!(parse_optional_body::<Body>(b"{not json").is_err());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(to_custom_error_code("unauthorized"), 1002);
        assert_eq!(to_custom_error_code("llm_not_configured"), 1202);
        assert_eq!(to_custom_error_code("something_else"), 1999);
    }
}
