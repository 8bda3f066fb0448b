use chrono::SecondsFormat;
use revmon_common::types::AlertInstanceWithRule;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{InsightError, Result};
use crate::sanitize::sanitize_value;

pub const SCHEMA_NAME: &str = "alert_insight_v1";

const THRESHOLD_KEYS: [&str; 9] = [
    "lookback_days",
    "baseline_days",
    "threshold_pct",
    "threshold_rate",
    "multiplier",
    "min_visits",
    "min_purchases",
    "min_revenue_eur",
    "freshness_minutes",
];

const SNAPSHOT_KEYS: [&str; 6] = [
    "drop_ratio",
    "spike_multiplier",
    "analytics_lag_minutes",
    "revenue_lag_minutes",
    "analytics_last_event_at",
    "revenue_last_event_at",
];

/// System and user texts for one alert instance, plus the hash that keys
/// the insight cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightPrompt {
    pub system: String,
    pub user: String,
    pub prompt_hash: String,
}

fn system_text() -> String {
    let schema_line = format!("Return JSON that matches schema {SCHEMA_NAME}.");
    [
        "You are an operations analyst for alerts in a quiz SaaS platform.",
        "Explain why the alert fired and recommend practical follow-up actions.",
        "Do not include PII, direct identifiers, user-entered text, or external links.",
        "Use only the provided structured input.",
        schema_line.as_str(),
        "Keep output concise and concrete.",
    ]
    .join("\n")
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn read_number(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| json!(v)),
        _ => None,
    }
}

/// Thresholds as evaluated (from the context) with the rule params as
/// fallback.
fn thresholds(context: &Map<String, Value>, params: &Map<String, Value>) -> Map<String, Value> {
    THRESHOLD_KEYS
        .iter()
        .filter_map(|key| {
            read_number(context.get(*key))
                .or_else(|| read_number(params.get(*key)))
                .map(|v| (key.to_string(), v))
        })
        .collect()
}

fn window(value: Option<&Value>) -> Value {
    let Some(obj) = value.and_then(Value::as_object) else {
        return Value::Null;
    };
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    match (text("start"), text("end")) {
        (Some(start), Some(end)) => json!({ "start": start, "end": end }),
        _ => Value::Null,
    }
}

fn metrics_snapshot(context: &Map<String, Value>) -> Value {
    let section = |key: &str| match context.get(key) {
        Some(v @ Value::Object(_)) => sanitize_value(v),
        _ => Value::Null,
    };
    let mut metrics = Map::new();
    metrics.insert("current".into(), section("current"));
    metrics.insert("baseline".into(), section("baseline"));
    for key in SNAPSHOT_KEYS {
        if let Some(v) = context.get(key) {
            metrics.insert(key.into(), sanitize_value(v));
        }
    }
    Value::Object(metrics)
}

/// The structured input sent to the model. Identity data is removed before
/// anything is copied in.
pub fn prompt_input(record: &AlertInstanceWithRule) -> Value {
    let instance = &record.instance;
    let context = as_object(sanitize_value(&instance.context_json));
    let params = as_object(sanitize_value(&Value::Object(record.params.clone())));
    let scope = serde_json::to_value(&record.scope).unwrap_or(Value::Null);

    json!({
        "alert_instance": {
            "id": instance.id,
            "fired_at": instance.fired_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "severity": instance.severity,
            "status": instance.status,
        },
        "rule": {
            "id": instance.rule_id,
            "name": instance.rule_name,
            "type": instance.rule_type,
            "scope": sanitize_value(&scope),
            "thresholds": thresholds(&context, &params),
            "windows": {
                "current": window(context.get("current_window")),
                "baseline": window(context.get("baseline_window")),
            },
        },
        "metrics_snapshot": metrics_snapshot(&context),
        "constraints": {
            "pii": "never include personal data, direct identifiers, or user-entered text",
            "links": "do not require external links",
            "output": "prioritize concise, operationally actionable recommendations",
        },
    })
}

pub fn prompt_hash(model: &str, system: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(system.as_bytes());
    hasher.update(b"\n");
    hasher.update(user.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Builds the prompt for `record` under `model`. The same instance and
/// model always produce the same hash.
pub fn build_prompt(record: &AlertInstanceWithRule, model: &str) -> Result<InsightPrompt> {
    let model = model.trim();
    if model.is_empty() {
        return Err(InsightError::InvalidInput("model is required".into()));
    }

    let input = serde_json::to_string_pretty(&prompt_input(record))
        .map_err(|e| InsightError::InvalidInput(e.to_string()))?;
    let system = system_text();
    let schema_line = format!("schema_name: {SCHEMA_NAME}");
    let user = [
        "Analyze this alert instance and return structured output.",
        schema_line.as_str(),
        "alert_input_json:",
        input.as_str(),
    ]
    .join("\n");

    Ok(InsightPrompt {
        prompt_hash: prompt_hash(model, &system, &user),
        system,
        user,
    })
}
