use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use revmon_common::types::AlertScope;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{MetricsError, Result};
use crate::{fill_days, parse_day, parse_timestamp, DailyMetricsPoint, FreshnessSnapshot};
use crate::{MetricsProvider, ScopeFilter};

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_MARTS_DATASET: &str = "marts";

/// Connection settings for the warehouse backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQuerySettings {
    pub project_id: String,
    pub stripe_dataset: String,
    pub marts_dataset: String,
    pub access_token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// A named query parameter (`@name` in the SQL text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: &'static str,
    pub kind: ParamKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Date,
    String,
}

impl ParamKind {
    fn type_name(self) -> &'static str {
        match self {
            ParamKind::Date => "DATE",
            ParamKind::String => "STRING",
        }
    }
}

impl QueryParam {
    pub fn date(name: &'static str, value: NaiveDate) -> Self {
        Self {
            name,
            kind: ParamKind::Date,
            value: value.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn string(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            kind: ParamKind::String,
            value: value.into(),
        }
    }
}

/// Runs standard-SQL queries against the warehouse and returns rows keyed by
/// column name. Values keep the warehouse's JSON encoding.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Map<String, Value>>>;
}

/// [`QueryExecutor`] backed by the `jobs.query` REST endpoint.
pub struct RestQueryExecutor {
    client: Client,
    base_url: String,
    project_id: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl RestQueryExecutor {
    pub fn new(settings: &BigQuerySettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            project_id: settings.project_id.clone(),
            access_token: settings.access_token.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl QueryExecutor for RestQueryExecutor {
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Map<String, Value>>> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "timeoutMs": self.timeout.as_millis() as u64,
            "queryParameters": params
                .iter()
                .map(|p| json!({
                    "name": p.name,
                    "parameterType": { "type": p.kind.type_name() },
                    "parameterValue": { "value": p.value },
                }))
                .collect::<Vec<_>>(),
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(url = %url, params = params.len(), "Running warehouse query");
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(MetricsError::Warehouse {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| MetricsError::Decode(format!("warehouse response is not JSON: {e}")))?;

        if payload.get("jobComplete").and_then(Value::as_bool) == Some(false) {
            return Err(MetricsError::Warehouse {
                status: 504,
                message: "query did not complete within the timeout".to_string(),
            });
        }

        decode_rest_rows(&payload)
    }
}

/// Turns a `jobs.query` response (`schema.fields` + `rows[].f[].v`) into
/// column-keyed maps.
pub fn decode_rest_rows(payload: &Value) -> Result<Vec<Map<String, Value>>> {
    if !payload.is_object() {
        return Err(MetricsError::Decode(format!(
            "expected a query response object, got {payload}"
        )));
    }
    let fields: Vec<&str> = payload
        .pointer("/schema/fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let Some(rows) = payload.get("rows").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    rows.iter()
        .map(|row| {
            let cells = row
                .get("f")
                .and_then(Value::as_array)
                .ok_or_else(|| MetricsError::Decode("row without cells".to_string()))?;
            Ok(fields
                .iter()
                .zip(cells)
                .map(|(name, cell)| {
                    (
                        (*name).to_string(),
                        cell.get("v").cloned().unwrap_or(Value::Null),
                    )
                })
                .collect())
        })
        .collect()
}

/// Reads the `marts` daily tables and the raw stripe purchases table.
pub struct BigQueryMetricsProvider {
    executor: Arc<dyn QueryExecutor>,
    project_id: String,
    stripe_dataset: String,
    marts_dataset: String,
}

impl BigQueryMetricsProvider {
    pub fn new(settings: &BigQuerySettings) -> Result<Self> {
        let executor = Arc::new(RestQueryExecutor::new(settings)?);
        Self::with_executor(settings, executor)
    }

    pub fn with_executor(
        settings: &BigQuerySettings,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self> {
        validate_settings(settings)?;
        let marts_dataset = if settings.marts_dataset.trim().is_empty() {
            DEFAULT_MARTS_DATASET.to_string()
        } else {
            settings.marts_dataset.trim().to_string()
        };
        Ok(Self {
            executor,
            project_id: settings.project_id.trim().to_string(),
            stripe_dataset: settings.stripe_dataset.trim().to_string(),
            marts_dataset,
        })
    }

    fn table(&self, dataset: &str, table: &str) -> String {
        format!("`{}.{}.{}`", self.project_id, dataset, table)
    }

    async fn latest(&self, sql: String, params: Vec<QueryParam>) -> Result<Option<DateTime<Utc>>> {
        match self.executor.query(&sql, &params).await {
            Ok(rows) => Ok(rows
                .first()
                .and_then(|row| row.get("last_loaded_at"))
                .and_then(value_timestamp)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    error = %e,
                    "Warehouse freshness source missing, treating as no data"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_settings(settings: &BigQuerySettings) -> Result<()> {
    if settings.project_id.trim().is_empty() {
        return Err(MetricsError::Config(
            "bigquery.project_id is required".to_string(),
        ));
    }
    if settings.stripe_dataset.trim().is_empty() {
        return Err(MetricsError::Config(
            "bigquery.stripe_dataset is required".to_string(),
        ));
    }
    Ok(())
}

fn scope_params(filter: &ScopeFilter) -> (Vec<String>, Vec<QueryParam>) {
    let mut preds = Vec::new();
    let mut params = Vec::new();
    if let Some(tenant) = &filter.tenant_id {
        preds.push("tenant_id = @tenant_id".to_string());
        params.push(QueryParam::string("tenant_id", tenant.clone()));
    }
    if let Some(test) = &filter.test_id {
        preds.push("test_id = @test_id".to_string());
        params.push(QueryParam::string("test_id", test.clone()));
    }
    (preds, params)
}

/// Warehouse cells arrive as strings, numbers, or nested `{value}` objects.
pub fn value_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(o) => o.get("value").map(value_f64),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn value_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_f64()
            .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)),
        Value::Object(o) => o.get("value").and_then(value_timestamp),
        _ => None,
    }
}

/// Maps one result row of the daily query; rows without a readable date are
/// skipped.
pub fn decode_daily_row(row: &Map<String, Value>) -> Option<DailyMetricsPoint> {
    let date = match row.get("date")? {
        Value::String(s) => parse_day(s)?,
        Value::Object(o) => parse_day(o.get("value")?.as_str()?)?,
        _ => return None,
    };
    let num = |key: &str| row.get(key).map(value_f64).unwrap_or(0.0);
    Some(DailyMetricsPoint {
        date,
        visits: num("visits"),
        purchases: num("purchases"),
        gross_revenue: num("gross_revenue_eur"),
        refunds: num("refunds_eur"),
        net_revenue: num("net_revenue_eur"),
    })
}

#[async_trait]
impl MetricsProvider for BigQueryMetricsProvider {
    async fn daily_metrics(
        &self,
        scope: &AlertScope,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyMetricsPoint>> {
        let Some(filter) = ScopeFilter::from_scope(scope) else {
            return Ok(Vec::new());
        };
        if start_date > end_date {
            return Ok(Vec::new());
        }

        let (scope_preds, scope_binds) = scope_params(&filter);
        let mut preds = vec![
            "date >= @start_date".to_string(),
            "date <= @end_date".to_string(),
        ];
        preds.extend(scope_preds);
        let where_sql = preds.join(" AND ");

        let sql = format!(
            "WITH days AS (
                SELECT day AS date
                FROM UNNEST(GENERATE_DATE_ARRAY(@start_date, @end_date)) AS day
            ),
            funnel AS (
                SELECT date,
                       SUM(COALESCE(visits, 0)) AS visits,
                       SUM(COALESCE(purchases, 0)) AS purchases
                FROM {funnel}
                WHERE {where_sql}
                GROUP BY date
            ),
            pnl AS (
                SELECT date,
                       SUM(COALESCE(gross_revenue_eur, 0)) AS gross_revenue_eur,
                       SUM(COALESCE(refunds_eur, 0)) AS refunds_eur,
                       SUM(COALESCE(net_revenue_eur, 0)) AS net_revenue_eur
                FROM {pnl}
                WHERE {where_sql}
                GROUP BY date
            )
            SELECT CAST(days.date AS STRING) AS date,
                   COALESCE(funnel.visits, 0) AS visits,
                   COALESCE(funnel.purchases, 0) AS purchases,
                   COALESCE(pnl.gross_revenue_eur, 0) AS gross_revenue_eur,
                   COALESCE(pnl.refunds_eur, 0) AS refunds_eur,
                   COALESCE(pnl.net_revenue_eur, 0) AS net_revenue_eur
            FROM days
            LEFT JOIN funnel ON funnel.date = days.date
            LEFT JOIN pnl ON pnl.date = days.date
            ORDER BY days.date ASC",
            funnel = self.table(&self.marts_dataset, "mart_funnel_daily"),
            pnl = self.table(&self.marts_dataset, "mart_pnl_daily"),
        );

        let mut params = vec![
            QueryParam::date("start_date", start_date),
            QueryParam::date("end_date", end_date),
        ];
        params.extend(scope_binds);

        let rows = self.executor.query(&sql, &params).await?;
        Ok(fill_days(
            start_date,
            end_date,
            rows.iter().filter_map(decode_daily_row),
        ))
    }

    async fn freshness_snapshot(&self, scope: &AlertScope) -> Result<FreshnessSnapshot> {
        let Some(filter) = ScopeFilter::from_scope(scope) else {
            return Ok(FreshnessSnapshot::default());
        };

        let (preds, params) = scope_params(&filter);
        let where_sql = if preds.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", preds.join(" AND "))
        };

        let funnel_sql = format!(
            "SELECT MAX(TIMESTAMP(date)) AS last_loaded_at FROM {} {where_sql}",
            self.table(&self.marts_dataset, "mart_funnel_daily")
        );
        let stripe_sql = format!(
            "SELECT MAX(created_utc) AS last_loaded_at FROM {} {where_sql}",
            self.table(&self.stripe_dataset, "purchases")
        );

        let (analytics, revenue) = tokio::join!(
            self.latest(funnel_sql, params.clone()),
            self.latest(stripe_sql, params)
        );

        Ok(FreshnessSnapshot {
            analytics_last_event_at: analytics?,
            revenue_last_event_at: revenue?,
        })
    }
}
