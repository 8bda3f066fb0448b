//! Batch alert evaluation over daily business metrics.
//!
//! A stored [`AlertRule`](revmon_common::types::AlertRule) is parsed into a
//! typed [`params::RuleSpec`], evaluated by the [`engine::RuleEngine`] against
//! a [`MetricsProvider`](revmon_metrics::MetricsProvider), and, when it
//! triggers, persisted by the [`runner::AlertRunner`] under a time-bucketed
//! [`fingerprint`] so repeated runs within the same bucket insert at most one
//! alert instance.

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod params;
pub mod rules;
pub mod runner;
pub mod window;


use revmon_common::types::Severity;
use serde::Serialize;
use serde_json::{Map, Value};

pub use engine::{safe_ratio, RuleEngine};
pub use error::{AlertError, Result};
pub use runner::{AlertRunner, RunReport, RunRequest, RuleRunResult};

/// Outcome of evaluating a single rule.
///
/// `context` is the frozen snapshot persisted with the alert instance: scope,
/// rule identity, windows, thresholds and the aggregates that were compared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub triggered: bool,
    pub severity: Severity,
    pub reason: String,
    pub context: Map<String, Value>,
}

impl Evaluation {
    pub(crate) fn new(
        triggered: bool,
        severity: Severity,
        reason: &str,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            triggered,
            severity,
            reason: reason.to_string(),
            context,
        }
    }
}

/// Severity for a triggered rule: `critical` when `escalate` holds, else
/// `warn`. Non-triggered evaluations are always `info`.
pub(crate) fn grade(triggered: bool, escalate: bool) -> Severity {
    match (triggered, escalate) {
        (false, _) => Severity::Info,
        (true, true) => Severity::Critical,
        (true, false) => Severity::Warn,
    }
}
