use crate::api::{
    deserialize_flag, error_response, parse_body, storage_error_response, success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use revmon_common::types::{non_empty, AlertRuleType, InstanceStatus};
use revmon_storage::{AlertRuleInput, InstanceFilter, RuleFilter};
use serde::Deserialize;

// ---- Alert Rules ----

#[derive(Debug, Default, Deserialize)]
pub struct ListRulesParams {
    #[serde(default, deserialize_with = "deserialize_flag")]
    enabled_only: bool,
}

pub async fn list_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListRulesParams>,
) -> impl IntoResponse {
    let filter = RuleFilter {
        enabled_only: params.enabled_only,
        rule_id: None,
    };
    match state.store.list_rules(&filter).await {
        Ok(rules) => success_response(StatusCode::OK, &trace_id, rules),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

pub async fn get_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_rule(&id).await {
        Ok(Some(rule)) => success_response(StatusCode::OK, &trace_id, rule),
        Ok(None) => rule_not_found(&trace_id),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

pub async fn create_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let input: AlertRuleInput = match parse_body(&body) {
        Ok(input) => input,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };
    match state.store.create_rule(&input).await {
        Ok(rule) => {
            tracing::info!(
                rule_id = %rule.id,
                rule_type = %rule.rule_type.as_str(),
                "Alert rule created"
            );
            success_response(StatusCode::CREATED, &trace_id, rule)
        }
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

pub async fn update_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let input: AlertRuleInput = match parse_body(&body) {
        Ok(input) => input,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };
    match state.store.update_rule(&id, &input).await {
        Ok(Some(rule)) => {
            tracing::info!(rule_id = %rule.id, enabled = rule.enabled, "Alert rule updated");
            success_response(StatusCode::OK, &trace_id, rule)
        }
        Ok(None) => rule_not_found(&trace_id),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

fn rule_not_found(trace_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        trace_id,
        "not_found",
        "Alert rule not found",
    )
}

// ---- Alert Instances ----

/// Query parameters are kept as text so that bad values answer with the
/// JSON envelope instead of a plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ListInstancesParams {
    status: Option<String>,
    severity: Option<String>,
    tenant_id: Option<String>,
    rule_type: Option<String>,
    limit: Option<String>,
}

impl ListInstancesParams {
    fn into_filter(self) -> Result<InstanceFilter, String> {
        let status = non_empty(self.status.as_deref())
            .map(|s| s.parse())
            .transpose()?;
        let severity = non_empty(self.severity.as_deref())
            .map(|s| s.parse())
            .transpose()?;
        let rule_type = non_empty(self.rule_type.as_deref())
            .map(|s| {
                AlertRuleType::parse_known(&s).ok_or_else(|| format!("unknown rule type: {s}"))
            })
            .transpose()?;
        let limit = non_empty(self.limit.as_deref())
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| format!("limit must be a non-negative integer: {s}"))
            })
            .transpose()?;
        Ok(InstanceFilter {
            status,
            severity,
            tenant_id: non_empty(self.tenant_id.as_deref()),
            rule_type,
            limit,
        })
    }
}

pub async fn list_instances(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListInstancesParams>,
) -> impl IntoResponse {
    let filter = match params.into_filter() {
        Ok(f) => f,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };
    match state.store.list_instances(&filter).await {
        Ok(instances) => success_response(StatusCode::OK, &trace_id, instances),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateStatusBody {
    status: String,
}

pub async fn update_instance_status(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let status: InstanceStatus = match parse_body::<UpdateStatusBody>(&body)
        .and_then(|b| b.status.parse())
    {
        Ok(status) => status,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };
    match state.store.update_instance_status(&id, status).await {
        Ok(Some(instance)) => {
            tracing::info!(
                alert_instance_id = %id,
                status = %status,
                "Alert instance status updated"
            );
            success_response(StatusCode::OK, &trace_id, instance)
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Alert instance not found",
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}
