use chrono::{DateTime, Utc};
use revmon_metrics::FreshnessSnapshot;
use serde_json::{json, Map, Value};

use crate::engine::{iso_millis, RuleContext};
use crate::params::read_whole;
use crate::{grade, Evaluation};

#[derive(Debug, Clone, PartialEq)]
pub struct DataFreshnessParams {
    /// Maximum tolerated lag of either source, in minutes.
    pub freshness_minutes: u32,
}

impl DataFreshnessParams {
    pub fn from_map(params: &Map<String, Value>) -> Self {
        Self {
            freshness_minutes: read_whole(params, "freshness_minutes", 30, 1, 10_080),
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, snapshot: &FreshnessSnapshot) -> Evaluation {
        let threshold = i64::from(self.freshness_minutes);
        let analytics_lag = lag_minutes(snapshot.analytics_last_event_at, ctx.now);
        let revenue_lag = lag_minutes(snapshot.revenue_last_event_at, ctx.now);

        // A source that never reported counts as infinitely stale.
        let stale = |lag: Option<i64>| lag.map_or(true, |m| m > threshold);
        let triggered = stale(analytics_lag) || stale(revenue_lag);
        let max_lag = analytics_lag
            .unwrap_or(threshold * 3)
            .max(revenue_lag.unwrap_or(threshold * 3));
        let severity = grade(triggered, max_lag >= threshold * 3);

        let mut context = ctx.base();
        context.insert("threshold_minutes".into(), json!(threshold));
        context.insert(
            "analytics_last_event_at".into(),
            json!(snapshot.analytics_last_event_at.map(iso_millis)),
        );
        context.insert(
            "revenue_last_event_at".into(),
            json!(snapshot.revenue_last_event_at.map(iso_millis)),
        );
        context.insert("analytics_lag_minutes".into(), json!(analytics_lag));
        context.insert("revenue_lag_minutes".into(), json!(revenue_lag));

        let reason = if triggered {
            "freshness_threshold_exceeded"
        } else {
            "freshness_ok"
        };
        Evaluation::new(triggered, severity, reason, context)
    }
}

/// Whole minutes between `last` and `now`; timestamps in the future count as
/// zero lag.
pub fn lag_minutes(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    last.map(|ts| {
        let delta = now - ts;
        if delta.num_milliseconds() <= 0 {
            0
        } else {
            delta.num_minutes()
        }
    })
}
