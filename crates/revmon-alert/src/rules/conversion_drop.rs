use serde_json::{json, Map, Value};

use crate::engine::{safe_ratio, RuleContext};
use crate::params::{read_number, read_whole, WindowParams};
use crate::window::ObservedWindows;
use crate::{grade, Evaluation};

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionDropParams {
    pub window: WindowParams,
    /// Relative drop of the conversion rate that fires the rule.
    pub threshold_pct: f64,
    /// Minimum visits required in both windows.
    pub min_visits: u32,
}

impl ConversionDropParams {
    pub fn from_map(params: &Map<String, Value>) -> Self {
        Self {
            window: WindowParams::from_map(params),
            threshold_pct: read_number(params, "threshold_pct", 0.3, 0.01, 1.0),
            min_visits: read_whole(params, "min_visits", 50, 0, 1_000_000),
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, observed: &ObservedWindows) -> Evaluation {
        let current = &observed.current;
        let baseline = &observed.baseline;
        let min_visits = f64::from(self.min_visits);

        let current_rate = safe_ratio(current.purchases, current.visits);
        let baseline_rate = safe_ratio(baseline.purchases, baseline.visits);
        let drop_ratio = if baseline_rate > 0.0 {
            1.0 - current_rate / baseline_rate
        } else {
            0.0
        };

        let triggered = baseline.visits >= min_visits
            && current.visits >= min_visits
            && baseline_rate > 0.0
            && drop_ratio >= self.threshold_pct;
        let severity = grade(triggered, drop_ratio >= self.threshold_pct * 1.5);

        let mut context = ctx.windowed(&observed.windows);
        context.insert("threshold_pct".into(), json!(self.threshold_pct));
        context.insert("min_visits".into(), json!(self.min_visits));
        context.insert(
            "current".into(),
            json!({
                "visits": current.visits,
                "purchases": current.purchases,
                "conversion_rate": current_rate,
            }),
        );
        context.insert(
            "baseline".into(),
            json!({
                "visits": baseline.visits,
                "purchases": baseline.purchases,
                "conversion_rate": baseline_rate,
            }),
        );
        context.insert("drop_ratio".into(), json!(drop_ratio));

        let reason = if triggered {
            "conversion_drop"
        } else {
            "conversion_within_threshold"
        };
        Evaluation::new(triggered, severity, reason, context)
    }
}
