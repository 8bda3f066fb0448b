use crate::bigquery::{
    decode_daily_row, decode_rest_rows, value_timestamp, BigQueryMetricsProvider,
    BigQuerySettings, ParamKind, QueryExecutor, QueryParam, RestQueryExecutor,
};
use crate::content_db::ContentDbMetricsProvider;
use crate::mock::MockMetricsProvider;
use crate::{
    day_range, fill_days, parse_timestamp, DailyMetricsPoint, MetricsError, MetricsProvider,
    ScopeFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use revmon_common::types::AlertScope;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn scope(tenant: Option<&str>, content_type: Option<&str>, key: Option<&str>) -> AlertScope {
    AlertScope {
        tenant_id: tenant.map(str::to_string),
        content_type: content_type.map(str::to_string),
        content_key: key.map(str::to_string),
    }
}

// ---- shared helpers ----

#[test]
fn fill_days_zero_fills_missing_days() {
    let mut point = DailyMetricsPoint::zero(day("2026-02-02"));
    point.visits = 12.0;
    let filled = fill_days(day("2026-02-01"), day("2026-02-03"), vec![point]);

    assert_eq!(filled.len(), 3);
    assert_eq!(filled[0], DailyMetricsPoint::zero(day("2026-02-01")));
    assert_eq!(filled[1].visits, 12.0);
    assert_eq!(filled[2].date, day("2026-02-03"));
    assert_eq!(filled[2].visits, 0.0);
}

#[test]
fn fill_days_drops_out_of_range_rows() {
    let outside = DailyMetricsPoint {
        visits: 99.0,
        ..DailyMetricsPoint::zero(day("2026-01-15"))
    };
    let filled = fill_days(day("2026-02-01"), day("2026-02-01"), vec![outside]);
    assert_eq!(filled, vec![DailyMetricsPoint::zero(day("2026-02-01"))]);
}

#[test]
fn inverted_range_is_empty() {
    assert!(day_range(day("2026-02-03"), day("2026-02-01")).is_empty());
    assert!(fill_days(day("2026-02-03"), day("2026-02-01"), Vec::new()).is_empty());
}

#[test]
fn scope_filter_rejects_unsupported_content_type() {
    assert!(ScopeFilter::from_scope(&scope(None, Some("course"), Some("c-1"))).is_none());

    let filter = ScopeFilter::from_scope(&scope(Some(" t1 "), Some("TEST"), Some("q-1"))).unwrap();
    assert_eq!(filter.tenant_id.as_deref(), Some("t1"));
    assert_eq!(filter.test_id.as_deref(), Some("q-1"));
}

#[test]
fn parse_timestamp_accepts_common_encodings() {
    let expected = ts("2026-02-01T10:00:00Z");
    assert_eq!(parse_timestamp("2026-02-01T10:00:00Z"), Some(expected));
    assert_eq!(parse_timestamp("2026-02-01T10:00:00+00:00"), Some(expected));
    assert_eq!(parse_timestamp("2026-02-01 10:00:00"), Some(expected));
    assert_eq!(parse_timestamp("1.7699400E9"), Some(expected));
    assert_eq!(parse_timestamp("garbage"), None);
    assert_eq!(parse_timestamp(""), None);
}

#[tokio::test]
async fn mock_provider_returns_nothing() {
    let provider = MockMetricsProvider;
    let series = provider
        .daily_metrics(&AlertScope::default(), day("2026-02-01"), day("2026-02-07"))
        .await
        .unwrap();
    assert!(series.is_empty());

    let fresh = provider.freshness_snapshot(&AlertScope::default()).await.unwrap();
    assert!(fresh.analytics_last_event_at.is_none());
    assert!(fresh.revenue_last_event_at.is_none());
}

// ---- content-db backend ----

async fn setup_db() -> (TempDir, DatabaseConnection) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("content.db").display());
    let db = Database::connect(&url).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    (dir, db)
}

async fn exec(db: &DatabaseConnection, sql: &str, values: Vec<sea_orm::Value>) {
    db.execute(Statement::from_sql_and_values(DbBackend::Sqlite, sql, values))
        .await
        .unwrap();
}

async fn event(
    db: &DatabaseConnection,
    id: &str,
    tenant: &str,
    test: &str,
    session: &str,
    name: &str,
    at: &str,
) {
    exec(
        db,
        "INSERT INTO analytics_events (event_id, tenant_id, test_id, session_id, event_name, occurred_at) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            tenant.into(),
            test.into(),
            session.into(),
            name.into(),
            ts(at).into(),
        ],
    )
    .await;
}

async fn purchase(
    db: &DatabaseConnection,
    id: &str,
    tenant: &str,
    test: &str,
    amount: f64,
    at: &str,
) {
    exec(
        db,
        "INSERT INTO stripe_purchases (purchase_id, tenant_id, test_id, amount_eur, created_utc) VALUES (?, ?, ?, ?, ?)",
        vec![id.into(), tenant.into(), test.into(), amount.into(), ts(at).into()],
    )
    .await;
}

/// Inserts a refund, dispute or fee row tied to a purchase.
async fn child(
    db: &DatabaseConnection,
    kind: &str,
    id: &str,
    purchase: &str,
    amount: f64,
    at: &str,
) {
    let (table, id_col, amount_col) = match kind {
        "refund" => ("stripe_refunds", "refund_id", "amount_eur"),
        "dispute" => ("stripe_disputes", "dispute_id", "amount_eur"),
        _ => ("stripe_fees", "fee_id", "fee_eur"),
    };
    let sql = format!(
        "INSERT INTO {table} ({id_col}, purchase_id, {amount_col}, created_utc) VALUES (?, ?, ?, ?)"
    );
    exec(
        db,
        &sql,
        vec![id.into(), purchase.into(), amount.into(), ts(at).into()],
    )
    .await;
}

async fn seed(db: &DatabaseConnection) {
    event(db, "e1", "tenant-a", "test-1", "s1", "page_view", "2026-02-01T08:00:00Z").await;
    event(db, "e2", "tenant-a", "test-1", "s1", "page_view", "2026-02-01T09:00:00Z").await;
    event(db, "e3", "tenant-a", "test-1", "s2", "page_view", "2026-02-01T10:00:00Z").await;
    event(db, "e4", "tenant-a", "test-1", "s3", "quiz_start", "2026-02-01T11:00:00Z").await;
    event(db, "e5", "tenant-b", "test-9", "s4", "page_view", "2026-02-01T12:00:00Z").await;
    event(db, "e6", "tenant-a", "test-1", "s5", "page_view", "2026-02-03T07:30:00Z").await;

    purchase(db, "p1", "tenant-a", "test-1", 100.0, "2026-02-02T10:00:00Z").await;
    purchase(db, "p2", "tenant-a", "test-1", 50.0, "2026-01-20T10:00:00Z").await;
    purchase(db, "p3", "tenant-b", "test-9", 70.0, "2026-02-02T10:00:00Z").await;

    // p2 was bought before the window; its refund still lands on the refund day.
    child(db, "refund", "r1", "p2", 20.0, "2026-02-02T12:00:00Z").await;
    child(db, "refund", "r2", "p3", 10.0, "2026-02-02T12:00:00Z").await;
    child(db, "dispute", "d1", "p1", 5.0, "2026-02-03T12:00:00Z").await;
    child(db, "fee", "f1", "p1", 3.0, "2026-02-02T10:00:05Z").await;
}

#[tokio::test]
async fn content_db_aggregates_scoped_daily_metrics() {
    let (_dir, db) = setup_db().await;
    seed(&db).await;
    let provider = ContentDbMetricsProvider::new(db);

    let series = provider
        .daily_metrics(
            &scope(Some("tenant-a"), Some("test"), Some("test-1")),
            day("2026-02-01"),
            day("2026-02-04"),
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 4);
    assert_eq!(series[0].date, day("2026-02-01"));
    assert_eq!(series[0].visits, 2.0);
    assert_eq!(series[0].purchases, 0.0);

    assert_eq!(series[1].purchases, 1.0);
    assert_eq!(series[1].gross_revenue, 100.0);
    assert_eq!(series[1].refunds, 20.0);
    assert!((series[1].net_revenue - 77.0).abs() < 1e-9);

    assert_eq!(series[2].visits, 1.0);
    assert!((series[2].net_revenue + 5.0).abs() < 1e-9);

    assert_eq!(series[3], DailyMetricsPoint::zero(day("2026-02-04")));
}

#[tokio::test]
async fn content_db_unscoped_counts_every_tenant() {
    let (_dir, db) = setup_db().await;
    seed(&db).await;
    let provider = ContentDbMetricsProvider::new(db);

    let series = provider
        .daily_metrics(&AlertScope::default(), day("2026-02-01"), day("2026-02-02"))
        .await
        .unwrap();

    assert_eq!(series[0].visits, 3.0);
    assert_eq!(series[1].purchases, 2.0);
    assert_eq!(series[1].refunds, 30.0);
}

#[tokio::test]
async fn content_db_unsupported_scope_is_empty() {
    let (_dir, db) = setup_db().await;
    seed(&db).await;
    let provider = ContentDbMetricsProvider::new(db);

    let unsupported = scope(Some("tenant-a"), Some("course"), Some("test-1"));
    let series = provider
        .daily_metrics(&unsupported, day("2026-02-01"), day("2026-02-04"))
        .await
        .unwrap();
    assert!(series.is_empty());

    let fresh = provider.freshness_snapshot(&unsupported).await.unwrap();
    assert!(fresh.analytics_last_event_at.is_none());
    assert!(fresh.revenue_last_event_at.is_none());
}

#[tokio::test]
async fn content_db_inverted_range_is_empty() {
    let (_dir, db) = setup_db().await;
    let provider = ContentDbMetricsProvider::new(db);
    let series = provider
        .daily_metrics(&AlertScope::default(), day("2026-02-04"), day("2026-02-01"))
        .await
        .unwrap();
    assert!(series.is_empty());
}

#[tokio::test]
async fn content_db_freshness_reports_latest_events() {
    let (_dir, db) = setup_db().await;
    seed(&db).await;
    let provider = ContentDbMetricsProvider::new(db);

    let fresh = provider
        .freshness_snapshot(&scope(Some("tenant-a"), None, None))
        .await
        .unwrap();
    assert_eq!(fresh.analytics_last_event_at, Some(ts("2026-02-03T07:30:00Z")));
    assert_eq!(fresh.revenue_last_event_at, Some(ts("2026-02-02T10:00:00Z")));

    let empty = provider
        .freshness_snapshot(&scope(Some("tenant-z"), None, None))
        .await
        .unwrap();
    assert!(empty.analytics_last_event_at.is_none());
    assert!(empty.revenue_last_event_at.is_none());
}

// ---- warehouse backend ----

#[derive(Default)]
struct FakeExecutor {
    calls: Mutex<Vec<(String, Vec<QueryParam>)>>,
    rows: Vec<Map<String, Value>>,
    fail_with: Option<(u16, &'static str)>,
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn query(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> crate::Result<Vec<Map<String, Value>>> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        if let Some((status, message)) = self.fail_with {
            return Err(MetricsError::Warehouse {
                status,
                message: message.to_string(),
            });
        }
        Ok(self.rows.clone())
    }
}

fn settings() -> BigQuerySettings {
    BigQuerySettings {
        project_id: "acme-prod".into(),
        stripe_dataset: "stripe_raw".into(),
        marts_dataset: "marts".into(),
        access_token: Some("token".into()),
        base_url: crate::bigquery::DEFAULT_BASE_URL.into(),
        timeout_secs: 15,
    }
}

fn row(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn bigquery_daily_metrics_binds_scope_and_zero_fills() {
    let executor = Arc::new(FakeExecutor {
        rows: vec![row(json!({
            "date": "2026-02-02",
            "visits": "40",
            "purchases": "3",
            "gross_revenue_eur": "90.5",
            "refunds_eur": "10",
            "net_revenue_eur": "80.5"
        }))],
        ..Default::default()
    });
    let provider = BigQueryMetricsProvider::with_executor(&settings(), executor.clone()).unwrap();

    let series = provider
        .daily_metrics(
            &scope(Some("t1"), Some("test"), Some("quiz-7")),
            day("2026-02-01"),
            day("2026-02-03"),
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 3);
    assert_eq!(series[0].visits, 0.0);
    assert_eq!(series[1].visits, 40.0);
    assert_eq!(series[1].net_revenue, 80.5);

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (sql, params) = &calls[0];
    assert!(sql.contains("`acme-prod.marts.mart_funnel_daily`"));
    assert!(sql.contains("`acme-prod.marts.mart_pnl_daily`"));
    assert!(sql.contains("tenant_id = @tenant_id"));
    assert!(sql.contains("test_id = @test_id"));
    assert_eq!(params[0], QueryParam::date("start_date", day("2026-02-01")));
    assert_eq!(params[1].kind, ParamKind::Date);
    assert_eq!(params[2], QueryParam::string("tenant_id", "t1"));
    assert_eq!(params[3], QueryParam::string("test_id", "quiz-7"));
}

#[tokio::test]
async fn bigquery_unsupported_scope_skips_queries() {
    let executor = Arc::new(FakeExecutor::default());
    let provider = BigQueryMetricsProvider::with_executor(&settings(), executor.clone()).unwrap();

    let unsupported = scope(None, Some("course"), None);
    assert!(provider
        .daily_metrics(&unsupported, day("2026-02-01"), day("2026-02-03"))
        .await
        .unwrap()
        .is_empty());
    assert!(provider
        .freshness_snapshot(&unsupported)
        .await
        .unwrap()
        .analytics_last_event_at
        .is_none());
    assert!(executor.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bigquery_freshness_treats_missing_table_as_null() {
    let executor = Arc::new(FakeExecutor {
        fail_with: Some((404, "Not found: Table acme-prod:stripe_raw.purchases")),
        ..Default::default()
    });
    let provider = BigQueryMetricsProvider::with_executor(&settings(), executor.clone()).unwrap();

    let fresh = provider.freshness_snapshot(&AlertScope::default()).await.unwrap();
    assert!(fresh.analytics_last_event_at.is_none());
    assert!(fresh.revenue_last_event_at.is_none());

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .any(|(sql, _)| sql.contains("`acme-prod.stripe_raw.purchases`")));
}

#[tokio::test]
async fn bigquery_freshness_propagates_other_errors() {
    let executor = Arc::new(FakeExecutor {
        fail_with: Some((403, "Access Denied")),
        ..Default::default()
    });
    let provider = BigQueryMetricsProvider::with_executor(&settings(), executor).unwrap();
    let err = provider
        .freshness_snapshot(&AlertScope::default())
        .await
        .unwrap_err();
    assert!(!err.is_not_found());
}

#[test]
fn bigquery_requires_project_and_stripe_dataset() {
    let mut s = settings();
    s.project_id = " ".into();
    let executor = Arc::new(FakeExecutor::default());
    assert!(matches!(
        BigQueryMetricsProvider::with_executor(&s, executor),
        Err(MetricsError::Config(_))
    ));
}

#[test]
fn decode_rest_rows_maps_schema_fields() {
    let payload = json!({
        "jobComplete": true,
        "schema": { "fields": [{ "name": "date" }, { "name": "visits" }] },
        "rows": [{ "f": [{ "v": "2026-02-01" }, { "v": "17" }] }]
    });
    let rows = decode_rest_rows(&payload).unwrap();
    assert_eq!(rows.len(), 1);
    let point = decode_daily_row(&rows[0]).unwrap();
    assert_eq!(point.date, day("2026-02-01"));
    assert_eq!(point.visits, 17.0);
    assert_eq!(point.net_revenue, 0.0);
}

#[test]
fn warehouse_timestamps_decode_from_epoch_seconds() {
    let expected = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
    assert_eq!(value_timestamp(&json!("1.7699400E9")), Some(expected));
    assert_eq!(value_timestamp(&json!({ "value": "2026-02-01T10:00:00Z" })), Some(expected));
    assert_eq!(value_timestamp(&Value::Null), None);
}

#[tokio::test]
async fn rest_executor_posts_named_parameters() {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/acme-prod/queries"))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": { "fields": [{ "name": "last_loaded_at" }] },
            "rows": [{ "f": [{ "v": "1.7699400E9" }] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut s = settings();
    s.base_url = server.uri();
    let executor = RestQueryExecutor::new(&s).unwrap();
    let rows = executor
        .query("SELECT 1", &[QueryParam::string("tenant_id", "t1")])
        .await
        .unwrap();
    assert_eq!(rows[0]["last_loaded_at"], json!("1.7699400E9"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["parameterMode"], "NAMED");
    assert_eq!(body["useLegacySql"], false);
    assert_eq!(body["queryParameters"][0]["name"], "tenant_id");
    assert_eq!(body["queryParameters"][0]["parameterType"]["type"], "STRING");
}

#[tokio::test]
async fn rest_executor_surfaces_not_found() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "Not found: Dataset acme-prod:marts" }
        })))
        .mount(&server)
        .await;

    let mut s = settings();
    s.base_url = server.uri();
    let executor = RestQueryExecutor::new(&s).unwrap();
    let err = executor.query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn rest_executor_rejects_unreadable_success_body() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>proxy login</html>"),
        )
        .mount(&server)
        .await;

    let mut s = settings();
    s.base_url = server.uri();
    let provider = BigQueryMetricsProvider::new(&s).unwrap();

    let fresh = provider.freshness_snapshot(&AlertScope::default()).await;
    assert!(matches!(fresh, Err(MetricsError::Decode(_))), "{fresh:?}");

    let series = provider
        .daily_metrics(&AlertScope::default(), day("2026-02-01"), day("2026-02-02"))
        .await;
    assert!(matches!(series, Err(MetricsError::Decode(_))), "{series:?}");
}

#[tokio::test]
async fn rest_executor_rejects_non_object_success_body() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("ok")))
        .mount(&server)
        .await;

    let mut s = settings();
    s.base_url = server.uri();
    let executor = RestQueryExecutor::new(&s).unwrap();
    let err = executor.query("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, MetricsError::Decode(_)));
    assert!(!err.is_not_found());
}
