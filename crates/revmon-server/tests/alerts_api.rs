mod common;

use axum::http::StatusCode;
use common::{
    assert_err_envelope, assert_ok_envelope, build_test_context, build_test_context_with,
    create_conversion_rule, fire_and_get_instance_id, request, request_json, run_internal,
    FakeLlm, TestOptions, RUNNER_SECRET,
};
use revmon_ai::LlmClient;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn health_should_return_ok_envelope() {
    let ctx = build_test_context().await.expect("test context should build");
    let (status, body, trace) = request_json(&ctx.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert!(body["data"]["version"].is_string());
    assert_eq!(body["data"]["metrics_provider"], "mock");
    assert_eq!(body["data"]["insight_configured"], false);
    let trace = trace.expect("trace id header should be set");
    assert_eq!(trace.len(), 16);
    assert_eq!(body["trace_id"], trace.as_str());
}

#[tokio::test]
async fn caller_trace_id_is_propagated() {
    let ctx = build_test_context().await.expect("test context should build");
    let (status, body, trace) = request(
        &ctx.app,
        "GET",
        "/v1/health",
        &[("X-Trace-Id", "nightly-cron-7")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trace.as_deref(), Some("nightly-cron-7"));
    assert_eq!(body["trace_id"], "nightly-cron-7");
}

#[tokio::test]
async fn internal_run_requires_matching_secret() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/internal/alerts/run", Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, _, _) = request(
        &ctx.app,
        "POST",
        "/v1/internal/alerts/run",
        &[("x-alerts-runner-secret", "wrong")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = run_internal(&ctx.app, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["evaluated"], 0);
}

#[tokio::test]
async fn internal_run_rejects_everyone_without_configured_secret() {
    let ctx = build_test_context_with(TestOptions {
        runner_secret: None,
        llm: None,
    })
    .await
    .expect("test context should build");

    let (status, body, _) = request(
        &ctx.app,
        "POST",
        "/v1/internal/alerts/run",
        &[("x-alerts-runner-secret", RUNNER_SECRET)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);
}

#[tokio::test]
async fn internal_run_fires_once_per_bucket() {
    let ctx = build_test_context().await.expect("test context should build");
    create_conversion_rule(&ctx.app, "Checkout conversion").await;

    let (status, body) = run_internal(&ctx.app, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let report = &body["data"];
    assert_eq!(report["evaluated"], 1);
    assert_eq!(report["triggered"], 1);
    assert_eq!(report["inserted"], 1);
    assert_eq!(report["failed"], 0);
    let result = &report["results"][0];
    assert_eq!(result["reason"], "conversion_drop");
    assert_eq!(result["severity"], "critical");
    assert!(result["fingerprint"].is_string());
    assert_eq!(result["context_json"]["tenant_id"], "tenant-a");

    let (status, body) = run_internal(&ctx.app, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["triggered"], 1);
    assert_eq!(body["data"]["inserted"], 0);
    assert_eq!(
        body["data"]["results"][0]["fingerprint"],
        result["fingerprint"]
    );

    let (_, body, _) = request_json(&ctx.app, "GET", "/v1/alerts/instances", None).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn internal_run_dry_run_from_query_string() {
    let ctx = build_test_context().await.expect("test context should build");
    create_conversion_rule(&ctx.app, "Checkout conversion").await;

    let (status, body, _) = request(
        &ctx.app,
        "POST",
        "/v1/internal/alerts/run?dry_run=true",
        &[("x-alerts-runner-secret", RUNNER_SECRET)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dry_run"], true);
    assert_eq!(body["data"]["triggered"], 1);
    assert_eq!(body["data"]["inserted"], 0);
    assert!(body["data"]["results"][0]["instance_id"].is_null());
}

#[tokio::test]
async fn internal_run_body_dry_run_overrides_query() {
    let ctx = build_test_context().await.expect("test context should build");
    create_conversion_rule(&ctx.app, "Checkout conversion").await;

    let (status, body, _) = request(
        &ctx.app,
        "POST",
        "/v1/internal/alerts/run?dry_run=1",
        &[("x-alerts-runner-secret", RUNNER_SECRET)],
        Some(json!({ "dry_run": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dry_run"], false);
    assert_eq!(body["data"]["inserted"], 1);
}

#[tokio::test]
async fn rule_crud_flow() {
    let ctx = build_test_context().await.expect("test context should build");
    let id = create_conversion_rule(&ctx.app, "Checkout conversion").await;

    let (status, body, _) = request_json(&ctx.app, "GET", "/v1/alerts/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"][0]["id"], id.as_str());
    assert_eq!(body["data"][0]["enabled"], true);

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/alerts/rules/{id}"),
        Some(json!({
            "name": "Checkout conversion (EU)",
            "enabled": false,
            "rule_type": "conversion_drop",
            "scope": { "tenant_id": " tenant-eu ", "content_key": "quiz-1" },
            "params": { "threshold_pct": 0.4 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(body["data"]["scope"]["tenant_id"], "tenant-eu");
    assert_eq!(body["data"]["scope"]["content_type"], "test");

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/rules?enabled_only=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));

    let (status, body, _) = request_json(&ctx.app, "GET", "/v1/alerts/rules/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        "/v1/alerts/rules/missing",
        Some(json!({ "name": "x", "rule_type": "traffic_spike" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rule_create_rejects_bad_input() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/rules",
        Some(json!({ "name": "Cohort", "rule_type": "cohort_decay" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/rules",
        Some(json!({ "rule_type": "traffic_spike" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn run_single_rule_ignores_enabled_flag() {
    let ctx = build_test_context().await.expect("test context should build");
    let id = create_conversion_rule(&ctx.app, "Checkout conversion").await;
    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/alerts/rules/{id}"),
        Some(json!({
            "name": "Checkout conversion",
            "enabled": false,
            "rule_type": "conversion_drop",
            "scope": { "tenant_id": "tenant-a" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/v1/alerts/rules/{id}/run"),
        Some(json!({ "dry_run": "yes" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rule_id"], id.as_str());
    assert_eq!(body["data"]["evaluated"], 1);
    assert_eq!(body["data"]["dry_run"], true);
    assert_eq!(body["data"]["inserted"], 0);

    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/alerts/rules/missing/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn instance_status_moves_forward_only() {
    let ctx = build_test_context().await.expect("test context should build");
    create_conversion_rule(&ctx.app, "Checkout conversion").await;
    let instance_id = fire_and_get_instance_id(&ctx.app).await;
    let uri = format!("/v1/alerts/instances/{instance_id}");

    let (status, body, _) = request_json(
        &ctx.app,
        "GET",
        "/v1/alerts/instances?status=open&severity=critical&tenant_id=tenant-a&rule_type=conversion_drop",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], instance_id.as_str());
    assert_eq!(body["data"][0]["rule_name"], "Checkout conversion");

    let (status, body, _) =
        request_json(&ctx.app, "PATCH", &uri, Some(json!({ "status": "acknowledged" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "acknowledged");

    let (status, body, _) =
        request_json(&ctx.app, "PATCH", &uri, Some(json!({ "status": "open" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1006);

    let (status, _, _) =
        request_json(&ctx.app, "PATCH", &uri, Some(json!({ "status": "closed" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = request_json(
        &ctx.app,
        "PATCH",
        "/v1/alerts/instances/missing",
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/instances?status=resolved", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));

    let (status, _, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/instances?limit=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn insight_requires_llm_when_nothing_cached() {
    let ctx = build_test_context().await.expect("test context should build");
    create_conversion_rule(&ctx.app, "Checkout conversion").await;
    let instance_id = fire_and_get_instance_id(&ctx.app).await;
    let uri = format!("/v1/alerts/instances/{instance_id}/insight");

    let (status, body, _) = request_json(&ctx.app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1202);

    let (status, body, _) = request_json(&ctx.app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1201);

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/instances/missing/insight", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
}

#[tokio::test]
async fn insight_is_generated_then_served_from_cache() {
    let llm = FakeLlm::new();
    let client: Arc<dyn LlmClient> = llm.clone();
    let ctx = build_test_context_with(TestOptions {
        llm: Some(client),
        ..Default::default()
    })
    .await
    .expect("test context should build");
    create_conversion_rule(&ctx.app, "Checkout conversion").await;
    let instance_id = fire_and_get_instance_id(&ctx.app).await;
    let uri = format!("/v1/alerts/instances/{instance_id}/insight");

    let (status, body, _) = request_json(&ctx.app, "POST", &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK, "generate failed: {body}");
    assert_eq!(body["data"]["cached"], false);
    let insight = &body["data"]["insight"];
    assert_eq!(insight["alert_instance_id"], instance_id.as_str());
    assert_eq!(insight["model"], "gpt-4o");
    assert!(insight["insight_md"]
        .as_str()
        .is_some_and(|md| md.starts_with("### Why this alert fired")));
    assert_eq!(insight["actions_json"]["actions"].as_array().map(Vec::len), Some(3));
    assert_eq!(llm.calls(), 1);

    let (status, body, _) = request_json(&ctx.app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cached"], true);
    assert_eq!(llm.calls(), 1);

    let (status, body, _) =
        request_json(&ctx.app, "POST", &uri, Some(json!({ "force": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cached"], false);
    assert_eq!(llm.calls(), 2);

    let (status, body, _) = request_json(&ctx.app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["alert_instance_id"], instance_id.as_str());
}
