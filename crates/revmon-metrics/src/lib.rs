//! Daily business metrics and data-freshness lookups for alert evaluation.
//!
//! [`MetricsProvider`] is the only seam the rule engine depends on. Three
//! backends implement it:
//!
//! - [`mock::MockMetricsProvider`] returns nothing (no data source configured),
//! - [`content_db::ContentDbMetricsProvider`] aggregates the operational
//!   tables through SeaORM (SQLite or PostgreSQL),
//! - [`bigquery::BigQueryMetricsProvider`] reads the warehouse marts.
//!
//! Both real backends share [`fill_days`] for zero-filling and
//! [`ScopeFilter`] for turning an [`AlertScope`] into column filters.

pub mod bigquery;
pub mod content_db;
pub mod error;
pub mod mock;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use revmon_common::types::AlertScope;
use serde::{Deserialize, Serialize};

pub use error::{MetricsError, Result};

/// Aggregated business metrics for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricsPoint {
    pub date: NaiveDate,
    pub visits: f64,
    pub purchases: f64,
    pub gross_revenue: f64,
    pub refunds: f64,
    pub net_revenue: f64,
}

impl DailyMetricsPoint {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            visits: 0.0,
            purchases: 0.0,
            gross_revenue: 0.0,
            refunds: 0.0,
            net_revenue: 0.0,
        }
    }
}

/// Most recent event timestamps per data source. `None` means no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreshnessSnapshot {
    pub analytics_last_event_at: Option<DateTime<Utc>>,
    pub revenue_last_event_at: Option<DateTime<Utc>>,
}

/// Source of daily metrics and freshness timestamps.
///
/// Implementations are shared between the scheduler and the HTTP handlers,
/// so they must be `Send + Sync`.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Returns one point per UTC day in `[start_date, end_date]`, ascending,
    /// with days lacking data filled with zeros. An inverted range or an
    /// unsupported scope yields an empty series.
    async fn daily_metrics(
        &self,
        scope: &AlertScope,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyMetricsPoint>>;

    /// Returns the latest analytics and revenue event timestamps for the scope.
    async fn freshness_snapshot(&self, scope: &AlertScope) -> Result<FreshnessSnapshot>;
}

/// Which backend the composition root should build.
///
/// # Examples
///
/// ```
/// use revmon_metrics::ProviderMode;
///
/// assert_eq!("content_db".parse::<ProviderMode>().unwrap(), ProviderMode::ContentDb);
/// assert_eq!("BigQuery".parse::<ProviderMode>().unwrap(), ProviderMode::BigQuery);
/// assert!("redshift".parse::<ProviderMode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    #[default]
    Mock,
    ContentDb,
    #[serde(rename = "bigquery")]
    BigQuery,
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(ProviderMode::Mock),
            "content_db" => Ok(ProviderMode::ContentDb),
            "bigquery" => Ok(ProviderMode::BigQuery),
            other => Err(format!("unknown metrics provider: {other}")),
        }
    }
}

impl std::fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderMode::Mock => write!(f, "mock"),
            ProviderMode::ContentDb => write!(f, "content_db"),
            ProviderMode::BigQuery => write!(f, "bigquery"),
        }
    }
}

/// Column filters derived from a normalized scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    pub tenant_id: Option<String>,
    pub test_id: Option<String>,
}

impl ScopeFilter {
    /// Returns `None` when the scope names a content type no backend can
    /// query; callers answer with empty data in that case.
    pub fn from_scope(scope: &AlertScope) -> Option<Self> {
        let scope = scope.normalized();
        if !scope.is_supported() {
            return None;
        }
        Some(Self {
            tenant_id: scope.tenant_id,
            test_id: scope.content_key,
        })
    }
}

/// Every calendar day in `[start, end]`, ascending. Empty when inverted.
pub fn day_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start;
    while day <= end {
        days.push(day);
        day += Duration::days(1);
    }
    days
}

/// Lays `rows` onto the `[start, end]` calendar. Rows outside the range are
/// dropped, duplicate dates are summed, missing days become zeros.
pub fn fill_days(
    start: NaiveDate,
    end: NaiveDate,
    rows: impl IntoIterator<Item = DailyMetricsPoint>,
) -> Vec<DailyMetricsPoint> {
    let mut by_date: HashMap<NaiveDate, DailyMetricsPoint> = HashMap::new();
    for row in rows {
        if row.date < start || row.date > end {
            continue;
        }
        let slot = by_date
            .entry(row.date)
            .or_insert_with(|| DailyMetricsPoint::zero(row.date));
        slot.visits += row.visits;
        slot.purchases += row.purchases;
        slot.gross_revenue += row.gross_revenue;
        slot.refunds += row.refunds;
        slot.net_revenue += row.net_revenue;
    }

    day_range(start, end)
        .into_iter()
        .map(|day| {
            by_date
                .remove(&day)
                .unwrap_or_else(|| DailyMetricsPoint::zero(day))
        })
        .collect()
}

/// Parses a day from either `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(day);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc).date_naive())
}

/// Parses a timestamp rendered as RFC 3339, as `YYYY-MM-DD HH:MM:SS[.f][+offset]`,
/// or as epoch seconds (the warehouse REST encoding).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(value, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}
