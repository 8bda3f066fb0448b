use revmon_common::types::AlertRuleType;
use serde_json::{Map, Value};

use crate::rules::conversion_drop::ConversionDropParams;
use crate::rules::data_freshness::DataFreshnessParams;
use crate::rules::refund_spike::RefundSpikeParams;
use crate::rules::revenue_drop::RevenueDropParams;
use crate::rules::traffic_spike::TrafficSpikeParams;

pub const DEFAULT_DEDUPE_WINDOW_HOURS: u32 = 24;

/// Reads `key` as a finite number (JSON number or numeric string) clamped to
/// `[min, max]`. Missing or unparseable values yield `default`.
///
/// # Examples
///
/// ```
/// use revmon_alert::params::read_number;
/// use serde_json::json;
///
/// let params = json!({ "a": "0.5", "b": 99, "c": "abc" });
/// let params = params.as_object().unwrap();
/// assert_eq!(read_number(params, "a", 0.3, 0.01, 1.0), 0.5);
/// assert_eq!(read_number(params, "b", 0.3, 0.01, 1.0), 1.0);
/// assert_eq!(read_number(params, "c", 0.3, 0.01, 1.0), 0.3);
/// assert_eq!(read_number(params, "missing", 0.3, 0.01, 1.0), 0.3);
/// ```
pub fn read_number(
    params: &Map<String, Value>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> f64 {
    let candidate = match params.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match candidate.filter(|v| v.is_finite()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

/// Like [`read_number`], floored to a whole number.
pub fn read_whole(params: &Map<String, Value>, key: &str, default: u32, min: u32, max: u32) -> u32 {
    read_number(params, key, f64::from(default), f64::from(min), f64::from(max)).floor() as u32
}

/// Window lengths shared by every rule that compares two periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    pub lookback_days: u32,
    pub baseline_days: u32,
}

impl WindowParams {
    pub fn from_map(params: &Map<String, Value>) -> Self {
        Self {
            lookback_days: read_whole(params, "lookback_days", 1, 1, 30),
            baseline_days: read_whole(params, "baseline_days", 7, 1, 90),
        }
    }
}

/// How long a fired alert suppresses re-inserts for the same rule and scope.
pub fn dedupe_window_hours(params: &Map<String, Value>) -> u32 {
    read_whole(params, "dedupe_window_hours", DEFAULT_DEDUPE_WINDOW_HOURS, 1, 720)
}

/// A rule's type together with its parsed, bounds-checked parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSpec {
    ConversionDrop(ConversionDropParams),
    RevenueDrop(RevenueDropParams),
    RefundSpike(RefundSpikeParams),
    TrafficSpike(TrafficSpikeParams),
    DataFreshness(DataFreshnessParams),
    /// A stored type this engine does not know how to evaluate.
    Unsupported(String),
}

impl RuleSpec {
    pub fn parse(rule_type: &AlertRuleType, params: &Map<String, Value>) -> Self {
        match rule_type {
            AlertRuleType::ConversionDrop => {
                RuleSpec::ConversionDrop(ConversionDropParams::from_map(params))
            }
            AlertRuleType::RevenueDrop => {
                RuleSpec::RevenueDrop(RevenueDropParams::from_map(params))
            }
            AlertRuleType::RefundSpike => {
                RuleSpec::RefundSpike(RefundSpikeParams::from_map(params))
            }
            AlertRuleType::TrafficSpike => {
                RuleSpec::TrafficSpike(TrafficSpikeParams::from_map(params))
            }
            AlertRuleType::DataFreshnessFail => {
                RuleSpec::DataFreshness(DataFreshnessParams::from_map(params))
            }
            AlertRuleType::Other(name) => RuleSpec::Unsupported(name.clone()),
        }
    }
}
