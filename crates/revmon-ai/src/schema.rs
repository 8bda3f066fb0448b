//! The `alert_insight_v1` output contract: the JSON schema sent to the model
//! and the validation applied to whatever comes back.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{InsightError, Result};
use crate::sanitize::{
    collapse_whitespace, has_link_or_email, redact, truncate_chars, REDACTED_EMAIL, REDACTED_LINK,
};

const SUMMARY_MAX: usize = 500;
const HYPOTHESIS_MAX: usize = 220;
const TITLE_MAX: usize = 160;
const EFFECT_MAX: usize = 240;
const STEP_MAX: usize = 220;

const HYPOTHESES: (usize, usize) = (1, 5);
const ACTIONS: (usize, usize) = (3, 7);
const STEPS: (usize, usize) = (1, 5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightAction {
    pub title: String,
    pub steps: Vec<String>,
    pub expected_effect: String,
    pub risk_level: RiskLevel,
}

/// A validated model answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightPayload {
    pub summary: String,
    pub root_cause_hypotheses: Vec<String>,
    pub actions: Vec<InsightAction>,
}

/// JSON schema for strict structured output.
pub fn insight_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["summary", "root_cause_hypotheses", "actions"],
        "properties": {
            "summary": { "type": "string" },
            "root_cause_hypotheses": {
                "type": "array",
                "minItems": HYPOTHESES.0,
                "maxItems": HYPOTHESES.1,
                "items": { "type": "string" }
            },
            "actions": {
                "type": "array",
                "minItems": ACTIONS.0,
                "maxItems": ACTIONS.1,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["title", "steps", "expected_effect", "risk_level"],
                    "properties": {
                        "title": { "type": "string" },
                        "steps": {
                            "type": "array",
                            "minItems": STEPS.0,
                            "maxItems": STEPS.1,
                            "items": { "type": "string" }
                        },
                        "expected_effect": { "type": "string" },
                        "risk_level": { "type": "string", "enum": ["low", "medium", "high"] }
                    }
                }
            }
        }
    })
}

fn invalid(message: impl Into<String>) -> InsightError {
    InsightError::InvalidOutput(message.into())
}

/// Validates one text field: required, free of links and emails, and
/// non-empty after scrubbing. Returns the collapsed text cut to `max` chars.
fn output_text(value: Option<&Value>, field: &str, max: usize) -> Result<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(format!("{field} is required")))?;

    if has_link_or_email(&raw) {
        return Err(invalid(format!("{field} contains forbidden content")));
    }

    let safe = redact(&raw);
    if safe.is_empty() || safe == REDACTED_LINK || safe == REDACTED_EMAIL {
        return Err(invalid(format!("{field} is invalid")));
    }
    Ok(truncate_chars(&safe, max))
}

fn bounded_array<'a>(
    value: Option<&'a Value>,
    field: &str,
    (min, max): (usize, usize),
) -> Result<&'a Vec<Value>> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(format!("{field} is required")))?;
    if items.len() < min || items.len() > max {
        return Err(invalid(format!("{field} must include {min}-{max} items")));
    }
    Ok(items)
}

/// Checks a raw model answer against `alert_insight_v1`. Any violation
/// rejects the whole payload.
pub fn validate_payload(value: &Value) -> Result<InsightPayload> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("insight payload must be an object"))?;

    let summary = output_text(obj.get("summary"), "summary", SUMMARY_MAX)?;

    let root_cause_hypotheses = bounded_array(
        obj.get("root_cause_hypotheses"),
        "root_cause_hypotheses",
        HYPOTHESES,
    )?
    .iter()
    .enumerate()
    .map(|(i, item)| {
        output_text(
            Some(item),
            &format!("root_cause_hypotheses[{i}]"),
            HYPOTHESIS_MAX,
        )
    })
    .collect::<Result<Vec<_>>>()?;

    let actions = bounded_array(obj.get("actions"), "actions", ACTIONS)?
        .iter()
        .enumerate()
        .map(|(i, candidate)| validate_action(i, candidate))
        .collect::<Result<Vec<_>>>()?;

    Ok(InsightPayload {
        summary,
        root_cause_hypotheses,
        actions,
    })
}

fn validate_action(index: usize, candidate: &Value) -> Result<InsightAction> {
    let field = format!("actions[{index}]");
    let action = candidate
        .as_object()
        .ok_or_else(|| invalid(format!("{field} is invalid")))?;

    let title = output_text(action.get("title"), &format!("{field}.title"), TITLE_MAX)?;
    let expected_effect = output_text(
        action.get("expected_effect"),
        &format!("{field}.expected_effect"),
        EFFECT_MAX,
    )?;
    let risk_level = action
        .get("risk_level")
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse)
        .ok_or_else(|| invalid(format!("{field}.risk_level is invalid")))?;
    let steps = bounded_array(action.get("steps"), &format!("{field}.steps"), STEPS)?
        .iter()
        .enumerate()
        .map(|(i, step)| output_text(Some(step), &format!("{field}.steps[{i}]"), STEP_MAX))
        .collect::<Result<Vec<_>>>()?;

    Ok(InsightAction {
        title,
        steps,
        expected_effect,
        risk_level,
    })
}

/// Markdown stored alongside the structured payload.
///
/// # Examples
///
/// ```
/// use revmon_ai::{render_markdown, InsightPayload};
///
/// let md = render_markdown(&InsightPayload {
///     summary: "Checkout conversion halved.".into(),
///     root_cause_hypotheses: vec!["Payment form regression".into()],
///     actions: vec![],
/// });
/// assert_eq!(
///     md,
///     "### Why this alert fired\nCheckout conversion halved.\n\n### Root-cause hypotheses\n- Payment form regression"
/// );
/// ```
pub fn render_markdown(payload: &InsightPayload) -> String {
    let mut lines = vec![
        "### Why this alert fired".to_string(),
        payload.summary.clone(),
        String::new(),
        "### Root-cause hypotheses".to_string(),
    ];
    lines.extend(payload.root_cause_hypotheses.iter().map(|h| format!("- {h}")));
    lines.join("\n")
}
