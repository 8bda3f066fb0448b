use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use revmon_common::types::AlertScope;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, QueryResult, Statement};

use crate::error::Result;
use crate::{fill_days, parse_day, parse_timestamp, DailyMetricsPoint, FreshnessSnapshot};
use crate::{MetricsProvider, ScopeFilter};

/// Reads metrics straight from the operational tables (`analytics_events`,
/// `stripe_*`).
///
/// Visits are distinct sessions with a `page_view` event. Refunds, disputes
/// and fees are attributed to the day they were created, but only when they
/// belong to an in-scope purchase, regardless of when that purchase happened.
#[derive(Debug, Clone)]
pub struct ContentDbMetricsProvider {
    db: DatabaseConnection,
}

impl ContentDbMetricsProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;
        tracing::info!("Connected content-db metrics provider");
        Ok(Self { db })
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }
}

/// Accumulates bind values and hands out backend-specific numbered
/// placeholders (`?N` for SQLite, `$N` otherwise).
struct Binds {
    backend: DbBackend,
    values: Vec<sea_orm::Value>,
}

impl Binds {
    fn new(backend: DbBackend) -> Self {
        Self {
            backend,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: impl Into<sea_orm::Value>) -> String {
        self.values.push(value.into());
        let idx = self.values.len();
        match self.backend {
            DbBackend::Sqlite => format!("?{idx}"),
            _ => format!("${idx}"),
        }
    }

    fn statement(self, sql: String) -> Statement {
        Statement::from_sql_and_values(self.backend, sql, self.values)
    }
}

/// Appends `tenant_id` / `test_id` predicates for the given table alias.
/// Placeholders are shared between aliases, so the values are bound once.
fn scope_predicates(alias: &str, tenant: Option<&str>, test: Option<&str>) -> Vec<String> {
    let mut preds = Vec::new();
    if let Some(p) = tenant {
        preds.push(format!("{alias}.tenant_id = {p}"));
    }
    if let Some(p) = test {
        preds.push(format!("{alias}.test_id = {p}"));
    }
    preds
}

fn where_clause(preds: &[String]) -> String {
    if preds.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", preds.join(" AND "))
    }
}

fn read_f64(row: &QueryResult, col: &str) -> f64 {
    if let Ok(Some(v)) = row.try_get::<Option<f64>>("", col) {
        return if v.is_finite() { v } else { 0.0 };
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>>("", col) {
        return v as f64;
    }
    if let Ok(Some(v)) = row.try_get::<Option<String>>("", col) {
        return v.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0);
    }
    0.0
}

fn read_timestamp(row: &QueryResult, col: &str) -> Option<DateTime<Utc>> {
    if let Ok(Some(ts)) = row.try_get::<Option<DateTime<Utc>>>("", col) {
        return Some(ts);
    }
    row.try_get::<Option<String>>("", col)
        .ok()
        .flatten()
        .and_then(|s| parse_timestamp(&s))
}

#[async_trait]
impl MetricsProvider for ContentDbMetricsProvider {
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

        let mut binds = Binds::new(self.backend());
        let start = binds.push(start_date);
        let end = binds.push(end_date);
        let tenant = filter.tenant_id.clone().map(|t| binds.push(t));
        let test = filter.test_id.clone().map(|t| binds.push(t));

        let mut event_preds = vec![
            "ae.event_name = 'page_view'".to_string(),
            format!("DATE(ae.occurred_at) >= {start}"),
            format!("DATE(ae.occurred_at) <= {end}"),
        ];
        event_preds.extend(scope_predicates("ae", tenant.as_deref(), test.as_deref()));
        let purchase_where = where_clause(&scope_predicates(
            "sp",
            tenant.as_deref(),
            test.as_deref(),
        ));

        // One row per (day, metric); days without activity are filled in below.
        let sql = format!(
            "WITH purchase_dim AS (
                SELECT sp.purchase_id, DATE(sp.created_utc) AS day,
                       COALESCE(sp.amount_eur, 0) AS amount_eur
                FROM stripe_purchases sp
                {purchase_where}
            )
            SELECT CAST(DATE(ae.occurred_at) AS TEXT) AS day, 'visits' AS metric,
                   CAST(COUNT(DISTINCT ae.session_id) AS DOUBLE PRECISION) AS value
            FROM analytics_events ae
            {event_where}
            GROUP BY DATE(ae.occurred_at)
            UNION ALL
            SELECT CAST(pd.day AS TEXT), 'purchases',
                   CAST(COUNT(DISTINCT pd.purchase_id) AS DOUBLE PRECISION)
            FROM purchase_dim pd
            WHERE pd.day >= {start} AND pd.day <= {end}
            GROUP BY pd.day
            UNION ALL
            SELECT CAST(pd.day AS TEXT), 'gross',
                   CAST(COALESCE(SUM(pd.amount_eur), 0) AS DOUBLE PRECISION)
            FROM purchase_dim pd
            WHERE pd.day >= {start} AND pd.day <= {end}
            GROUP BY pd.day
            UNION ALL
            SELECT CAST(DATE(r.created_utc) AS TEXT), 'refunds',
                   CAST(COALESCE(SUM(COALESCE(r.amount_eur, 0)), 0) AS DOUBLE PRECISION)
            FROM stripe_refunds r
            JOIN purchase_dim pd ON pd.purchase_id = r.purchase_id
            WHERE DATE(r.created_utc) >= {start} AND DATE(r.created_utc) <= {end}
            GROUP BY DATE(r.created_utc)
            UNION ALL
            SELECT CAST(DATE(d.created_utc) AS TEXT), 'disputes',
                   CAST(COALESCE(SUM(COALESCE(d.amount_eur, 0)), 0) AS DOUBLE PRECISION)
            FROM stripe_disputes d
            JOIN purchase_dim pd ON pd.purchase_id = d.purchase_id
            WHERE DATE(d.created_utc) >= {start} AND DATE(d.created_utc) <= {end}
            GROUP BY DATE(d.created_utc)
            UNION ALL
            SELECT CAST(DATE(f.created_utc) AS TEXT), 'fees',
                   CAST(COALESCE(SUM(COALESCE(f.fee_eur, 0)), 0) AS DOUBLE PRECISION)
            FROM stripe_fees f
            JOIN purchase_dim pd ON pd.purchase_id = f.purchase_id
            WHERE DATE(f.created_utc) >= {start} AND DATE(f.created_utc) <= {end}
            GROUP BY DATE(f.created_utc)",
            event_where = where_clause(&event_preds),
        );

        let rows = self.db.query_all(binds.statement(sql)).await?;

        #[derive(Default)]
        struct DayTotals {
            visits: f64,
            purchases: f64,
            gross: f64,
            refunds: f64,
            disputes: f64,
            fees: f64,
        }

        let mut totals: HashMap<NaiveDate, DayTotals> = HashMap::new();
        for row in &rows {
            let Some(day) = row
                .try_get::<Option<String>>("", "day")
                .ok()
                .flatten()
                .and_then(|s| parse_day(&s))
            else {
                continue;
            };
            let metric: String = row.try_get("", "metric")?;
            let value = read_f64(row, "value");
            let slot = totals.entry(day).or_default();
            match metric.as_str() {
                "visits" => slot.visits += value,
                "purchases" => slot.purchases += value,
                "gross" => slot.gross += value,
                "refunds" => slot.refunds += value,
                "disputes" => slot.disputes += value,
                "fees" => slot.fees += value,
                _ => {}
            }
        }

        let points = totals.into_iter().map(|(date, t)| DailyMetricsPoint {
            date,
            visits: t.visits,
            purchases: t.purchases,
            gross_revenue: t.gross,
            refunds: t.refunds,
            net_revenue: t.gross - t.refunds - t.disputes - t.fees,
        });

        tracing::debug!(
            start = %start_date,
            end = %end_date,
            rows = rows.len(),
            "Loaded content-db daily metrics"
        );
        Ok(fill_days(start_date, end_date, points))
    }

    async fn freshness_snapshot(&self, scope: &AlertScope) -> Result<FreshnessSnapshot> {
        let Some(filter) = ScopeFilter::from_scope(scope) else {
            return Ok(FreshnessSnapshot::default());
        };

        let latest = |table: &str, alias: &str, column: &str| {
            let mut binds = Binds::new(self.backend());
            let tenant = filter.tenant_id.clone().map(|t| binds.push(t));
            let test = filter.test_id.clone().map(|t| binds.push(t));
            let preds = scope_predicates(alias, tenant.as_deref(), test.as_deref());
            let sql = format!(
                "SELECT MAX({alias}.{column}) AS last_loaded_at FROM {table} {alias} {}",
                where_clause(&preds)
            );
            binds.statement(sql)
        };

        let analytics_stmt = latest("analytics_events", "ae", "occurred_at");
        let revenue_stmt = latest("stripe_purchases", "sp", "created_utc");
        let (analytics, revenue) = tokio::join!(
            self.db.query_one(analytics_stmt),
            self.db.query_one(revenue_stmt)
        );

        Ok(FreshnessSnapshot {
            analytics_last_event_at: analytics?
                .as_ref()
                .and_then(|row| read_timestamp(row, "last_loaded_at")),
            revenue_last_event_at: revenue?
                .as_ref()
                .and_then(|row| read_timestamp(row, "last_loaded_at")),
        })
    }
}
