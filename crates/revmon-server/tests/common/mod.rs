#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use revmon_ai::{LlmClient, StructuredRequest};
use revmon_common::types::AlertScope;
use revmon_metrics::{day_range, DailyMetricsPoint, FreshnessSnapshot, MetricsProvider};
use revmon_server::app;
use revmon_server::bootstrap;
use revmon_server::config::ServerConfig;
use revmon_server::state::AppState;
use revmon_storage::{AlertStore, RuleStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const RUNNER_SECRET: &str = "test-runner-secret";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

/// Baseline days see 100 visits and 10 purchases, the last day of every
/// requested range only 2 purchases: an 80% conversion drop.
pub struct DroppingConversionProvider;

#[async_trait]
impl MetricsProvider for DroppingConversionProvider {
    async fn daily_metrics(
        &self,
        _scope: &AlertScope,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> revmon_metrics::Result<Vec<DailyMetricsPoint>> {
        Ok(day_range(start_date, end_date)
            .into_iter()
            .map(|date| {
                let purchases = if date == end_date { 2.0 } else { 10.0 };
                DailyMetricsPoint {
                    date,
                    visits: 100.0,
                    purchases,
                    gross_revenue: purchases * 20.0,
                    refunds: 0.0,
                    net_revenue: purchases * 20.0,
                }
            })
            .collect())
    }

    async fn freshness_snapshot(
        &self,
        _scope: &AlertScope,
    ) -> revmon_metrics::Result<FreshnessSnapshot> {
        Ok(FreshnessSnapshot::default())
    }
}

pub struct FakeLlm {
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn create_structured_response(
        &self,
        _request: &StructuredRequest<'_>,
    ) -> revmon_ai::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(valid_insight_payload())
    }
}

pub fn valid_insight_payload() -> Value {
    let action = |title: &str| {
        json!({
            "title": title,
            "steps": ["Compare checkout funnel step by step"],
            "expected_effect": "Locate the failing step",
            "risk_level": "low"
        })
    };
    json!({
        "summary": "Conversion fell sharply while traffic stayed flat.",
        "root_cause_hypotheses": ["Checkout regression after the last release"],
        "actions": [
            action("Review checkout errors"),
            action("Verify payment provider status"),
            action("Roll back the last checkout change")
        ]
    })
}

pub struct TestOptions {
    pub runner_secret: Option<String>,
    pub llm: Option<Arc<dyn LlmClient>>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            runner_secret: Some(RUNNER_SECRET.to_string()),
            llm: None,
        }
    }
}

pub async fn build_test_context() -> Result<TestContext> {
    build_test_context_with(TestOptions::default()).await
}

pub async fn build_test_context_with(options: TestOptions) -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let mut config = ServerConfig {
        runner_secret: options.runner_secret,
        ..Default::default()
    };
    config.database.url = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("revmon.db").display()
    );

    let store = Arc::new(AlertStore::new(&config.database.url).await?);
    let store: Arc<dyn RuleStore> = store;
    let state = bootstrap::build_state(
        config,
        store,
        Arc::new(DroppingConversionProvider),
        options.llm,
    );
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

pub async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    request(app, method, uri, &[], body).await
}

pub async fn run_internal(app: &axum::Router, body: Value) -> (StatusCode, Value) {
    let (status, body, _) = request(
        app,
        "POST",
        "/v1/internal/alerts/run",
        &[("x-alerts-runner-secret", RUNNER_SECRET)],
        Some(body),
    )
    .await;
    (status, body)
}

pub fn assert_ok_envelope(body: &Value) {
    assert_eq!(body["err_code"], 0, "unexpected envelope: {body}");
    assert_eq!(body["err_msg"], "success");
    assert!(body["trace_id"].is_string());
}

pub fn assert_err_envelope(body: &Value, err_code: i64) {
    assert_eq!(body["err_code"], err_code, "unexpected envelope: {body}");
    assert!(body["data"].is_null());
    assert!(body["trace_id"].is_string());
}

/// Creates an enabled conversion-drop rule and returns its id.
pub async fn create_conversion_rule(app: &axum::Router, name: &str) -> String {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/alerts/rules",
        Some(json!({
            "name": name,
            "rule_type": "conversion_drop",
            "scope": { "tenant_id": "tenant-a" },
            "params": { "threshold_pct": 0.3, "min_visits": 50 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["data"]["id"]
        .as_str()
        .expect("rule id should exist")
        .to_string()
}

/// Runs all enabled rules through the internal trigger and returns the id
/// of the first inserted instance.
pub async fn fire_and_get_instance_id(app: &axum::Router) -> String {
    let (status, body) = run_internal(app, json!({})).await;
    assert_eq!(status, StatusCode::OK, "run failed: {body}");
    body["data"]["results"]
        .as_array()
        .and_then(|results| {
            results
                .iter()
                .find_map(|r| r["instance_id"].as_str().map(str::to_string))
        })
        .expect("an instance should have been inserted")
}
