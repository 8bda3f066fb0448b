use serde_json::{json, Map, Value};

use crate::engine::RuleContext;
use crate::params::{read_number, WindowParams};
use crate::window::ObservedWindows;
use crate::{grade, Evaluation};

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueDropParams {
    pub window: WindowParams,
    pub threshold_pct: f64,
    /// Minimum average daily net revenue of the baseline, in EUR.
    pub min_revenue_eur: f64,
}

impl RevenueDropParams {
    pub fn from_map(params: &Map<String, Value>) -> Self {
        // `min_revenue` is accepted as a legacy spelling.
        let key = if params.contains_key("min_revenue_eur") {
            "min_revenue_eur"
        } else {
            "min_revenue"
        };
        Self {
            window: WindowParams::from_map(params),
            threshold_pct: read_number(params, "threshold_pct", 0.3, 0.01, 1.0),
            min_revenue_eur: read_number(params, key, 50.0, 0.0, 10_000_000.0),
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, observed: &ObservedWindows) -> Evaluation {
        let current = &observed.current;
        let baseline = &observed.baseline;

        let current_avg = current.net_revenue / f64::from(self.window.lookback_days);
        let baseline_avg = baseline.net_revenue / f64::from(self.window.baseline_days);
        let drop_ratio = if baseline_avg > 0.0 {
            1.0 - current_avg / baseline_avg
        } else {
            0.0
        };

        let triggered = baseline_avg >= self.min_revenue_eur
            && baseline_avg > 0.0
            && drop_ratio >= self.threshold_pct;
        let severity = grade(triggered, drop_ratio >= self.threshold_pct * 1.5);

        let mut context = ctx.windowed(&observed.windows);
        context.insert("threshold_pct".into(), json!(self.threshold_pct));
        context.insert("min_revenue_eur".into(), json!(self.min_revenue_eur));
        context.insert(
            "current".into(),
            json!({
                "net_revenue_eur": current.net_revenue,
                "avg_daily_net_revenue_eur": current_avg,
            }),
        );
        context.insert(
            "baseline".into(),
            json!({
                "net_revenue_eur": baseline.net_revenue,
                "avg_daily_net_revenue_eur": baseline_avg,
            }),
        );
        context.insert("drop_ratio".into(), json!(drop_ratio));

        let reason = if triggered {
            "revenue_drop"
        } else {
            "revenue_within_threshold"
        };
        Evaluation::new(triggered, severity, reason, context)
    }
}
