use chrono::{DateTime, Duration, NaiveDate, Utc};
use revmon_metrics::DailyMetricsPoint;
use serde::Serialize;

/// An inclusive range of UTC calendar days, serialized as
/// `{"start": "YYYY-MM-DD", "end": "YYYY-MM-DD"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// The evaluated period and the reference period right before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleWindows {
    pub current: DateWindow,
    pub baseline: DateWindow,
}

impl RuleWindows {
    /// `current` covers the `lookback_days` complete days ending yesterday
    /// (relative to `now` in UTC); `baseline` covers the `baseline_days`
    /// immediately before it. Both lengths must be at least one day.
    pub fn ending_yesterday(now: DateTime<Utc>, lookback_days: u32, baseline_days: u32) -> Self {
        let lookback = i64::from(lookback_days.max(1));
        let baseline = i64::from(baseline_days.max(1));

        let current_end = now.date_naive() - Duration::days(1);
        let current_start = current_end - Duration::days(lookback - 1);
        let baseline_end = current_start - Duration::days(1);
        let baseline_start = baseline_end - Duration::days(baseline - 1);

        Self {
            current: DateWindow {
                start: current_start,
                end: current_end,
            },
            baseline: DateWindow {
                start: baseline_start,
                end: baseline_end,
            },
        }
    }

    /// The full range to fetch from the provider.
    pub fn span(&self) -> DateWindow {
        DateWindow {
            start: self.baseline.start,
            end: self.current.end,
        }
    }
}

/// Sums of the daily metrics that fall inside a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowTotals {
    pub visits: f64,
    pub purchases: f64,
    pub gross_revenue: f64,
    pub refunds: f64,
    pub net_revenue: f64,
}

impl WindowTotals {
    pub fn sum(rows: &[DailyMetricsPoint], window: &DateWindow) -> Self {
        rows.iter()
            .filter(|row| window.contains(row.date))
            .fold(Self::default(), |acc, row| Self {
                visits: acc.visits + row.visits,
                purchases: acc.purchases + row.purchases,
                gross_revenue: acc.gross_revenue + row.gross_revenue,
                refunds: acc.refunds + row.refunds,
                net_revenue: acc.net_revenue + row.net_revenue,
            })
    }
}

/// Both windows of a rule with the totals observed in each.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedWindows {
    pub windows: RuleWindows,
    pub current: WindowTotals,
    pub baseline: WindowTotals,
}

impl ObservedWindows {
    pub fn from_rows(windows: RuleWindows, rows: &[DailyMetricsPoint]) -> Self {
        Self {
            windows,
            current: WindowTotals::sum(rows, &windows.current),
            baseline: WindowTotals::sum(rows, &windows.baseline),
        }
    }
}
