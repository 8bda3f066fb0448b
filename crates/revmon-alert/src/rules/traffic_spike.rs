use serde_json::{json, Map, Value};

use crate::engine::RuleContext;
use crate::params::{read_number, read_whole, WindowParams};
use crate::window::ObservedWindows;
use crate::{grade, Evaluation};

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSpikeParams {
    pub window: WindowParams,
    /// Ratio of current to baseline average daily visits that fires the rule.
    pub multiplier: f64,
    /// Minimum baseline average daily visits.
    pub min_visits: u32,
}

impl TrafficSpikeParams {
    pub fn from_map(params: &Map<String, Value>) -> Self {
        Self {
            window: WindowParams::from_map(params),
            multiplier: read_number(params, "multiplier", 1.8, 1.0, 20.0),
            min_visits: read_whole(params, "min_visits", 30, 0, 1_000_000),
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, observed: &ObservedWindows) -> Evaluation {
        let current = &observed.current;
        let baseline = &observed.baseline;

        let current_avg = current.visits / f64::from(self.window.lookback_days);
        let baseline_avg = baseline.visits / f64::from(self.window.baseline_days);
        let spike = if baseline_avg > 0.0 {
            current_avg / baseline_avg
        } else {
            0.0
        };

        let triggered = baseline_avg >= f64::from(self.min_visits) && spike >= self.multiplier;
        let severity = grade(triggered, spike >= self.multiplier * 1.75);

        let mut context = ctx.windowed(&observed.windows);
        context.insert("multiplier".into(), json!(self.multiplier));
        context.insert("min_visits".into(), json!(self.min_visits));
        context.insert(
            "current".into(),
            json!({
                "visits": current.visits,
                "avg_daily_visits": current_avg,
            }),
        );
        context.insert(
            "baseline".into(),
            json!({
                "visits": baseline.visits,
                "avg_daily_visits": baseline_avg,
            }),
        );
        context.insert("spike_multiplier".into(), json!(spike));

        let reason = if triggered {
            "traffic_spike"
        } else {
            "traffic_within_threshold"
        };
        Evaluation::new(triggered, severity, reason, context)
    }
}
