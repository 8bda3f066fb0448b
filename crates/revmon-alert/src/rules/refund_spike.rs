use serde_json::{json, Map, Value};

use crate::engine::{safe_ratio, RuleContext};
use crate::params::{read_number, read_whole, WindowParams};
use crate::window::ObservedWindows;
use crate::{grade, Evaluation};

#[derive(Debug, Clone, PartialEq)]
pub struct RefundSpikeParams {
    pub window: WindowParams,
    /// Absolute refund rate (refunds / gross) that must be reached.
    pub threshold_rate: f64,
    /// Required growth over the baseline refund rate.
    pub multiplier: f64,
    pub min_purchases: u32,
}

impl RefundSpikeParams {
    pub fn from_map(params: &Map<String, Value>) -> Self {
        Self {
            window: WindowParams::from_map(params),
            threshold_rate: read_number(params, "threshold_rate", 0.05, 0.01, 1.0),
            multiplier: read_number(params, "multiplier", 1.5, 1.0, 20.0),
            min_purchases: read_whole(params, "min_purchases", 5, 0, 1_000_000),
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>, observed: &ObservedWindows) -> Evaluation {
        let current = &observed.current;
        let baseline = &observed.baseline;

        let current_rate = safe_ratio(current.refunds, current.gross_revenue);
        let baseline_rate = safe_ratio(baseline.refunds, baseline.gross_revenue);
        let exceeds_baseline =
            baseline_rate <= 0.0 || current_rate >= baseline_rate * self.multiplier.max(1.0);

        let triggered = current.purchases >= f64::from(self.min_purchases)
            && current_rate >= self.threshold_rate
            && exceeds_baseline;
        let severity = grade(triggered, current_rate >= self.threshold_rate * 2.0);

        let mut context = ctx.windowed(&observed.windows);
        context.insert("threshold_rate".into(), json!(self.threshold_rate));
        context.insert("relative_multiplier".into(), json!(self.multiplier));
        context.insert("min_purchases".into(), json!(self.min_purchases));
        context.insert(
            "current".into(),
            json!({
                "purchases": current.purchases,
                "gross_revenue_eur": current.gross_revenue,
                "refunds_eur": current.refunds,
                "refund_rate": current_rate,
            }),
        );
        context.insert(
            "baseline".into(),
            json!({
                "purchases": baseline.purchases,
                "gross_revenue_eur": baseline.gross_revenue,
                "refunds_eur": baseline.refunds,
                "refund_rate": baseline_rate,
            }),
        );

        let reason = if triggered {
            "refund_spike"
        } else {
            "refund_rate_within_threshold"
        };
        Evaluation::new(triggered, severity, reason, context)
    }
}
