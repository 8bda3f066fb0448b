use async_trait::async_trait;
use chrono::NaiveDate;
use revmon_common::types::AlertScope;

use crate::error::Result;
use crate::{DailyMetricsPoint, FreshnessSnapshot, MetricsProvider};

/// Backend used when no data source is configured: every series is empty and
/// every timestamp is unknown.
#[derive(Debug, Default, Clone)]
pub struct MockMetricsProvider;

#[async_trait]
impl MetricsProvider for MockMetricsProvider {
    async fn daily_metrics(
        &self,
        _scope: &AlertScope,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<Vec<DailyMetricsPoint>> {
        Ok(Vec::new())
    }

    async fn freshness_snapshot(&self, _scope: &AlertScope) -> Result<FreshnessSnapshot> {
        Ok(FreshnessSnapshot::default())
    }
}
