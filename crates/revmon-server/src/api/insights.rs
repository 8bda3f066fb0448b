use crate::api::{
    deserialize_flag, error_response, insight_error_response, parse_optional_body,
    success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

pub async fn get_insight(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.insights.get(&id).await {
        Ok(Some(insight)) => success_response(StatusCode::OK, &trace_id, insight),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "insight_not_found",
            "No insight generated for this alert instance",
        ),
        Err(e) => insight_error_response(&trace_id, &e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateInsightBody {
    #[serde(default, deserialize_with = "deserialize_flag")]
    force: bool,
}

/// Returns the cached insight when the prompt is unchanged, otherwise asks
/// the LLM. `force` skips the cache.
pub async fn generate_insight(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let params: GenerateInsightBody = match parse_optional_body(&body) {
        Ok(p) => p,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };

    match state.insights.generate(&id, params.force).await {
        Ok(outcome) => success_response(StatusCode::OK, &trace_id, outcome),
        Err(e) => insight_error_response(&trace_id, &e),
    }
}
