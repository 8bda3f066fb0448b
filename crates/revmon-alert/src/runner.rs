use std::sync::Arc;

use chrono::{DateTime, Utc};
use revmon_common::types::{non_empty, AlertRule, AlertRuleType, InstanceStatus, Severity};
use revmon_storage::{NewAlertInstance, RuleFilter, RuleStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::RuleEngine;
use crate::fingerprint::fingerprint;
use crate::params::dedupe_window_hours;
use crate::Result;

/// Parameters of one batch run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    /// Evaluate only this rule, even when disabled. Blank counts as absent.
    #[serde(default)]
    pub rule_id: Option<String>,
    /// Evaluate and fingerprint without persisting instances.
    #[serde(default)]
    pub dry_run: bool,
    /// Evaluation time; defaults to the current time.
    #[serde(skip)]
    pub now: Option<DateTime<Utc>>,
}

/// Per-rule outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RuleRunResult {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: AlertRuleType,
    pub triggered: bool,
    pub severity: Severity,
    pub reason: String,
    pub fingerprint: Option<String>,
    pub inserted: bool,
    pub instance_id: Option<String>,
    #[serde(rename = "context_json")]
    pub context: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub rule_id: Option<String>,
    pub dry_run: bool,
    pub evaluated: usize,
    pub triggered: usize,
    pub inserted: usize,
    pub failed: usize,
    pub results: Vec<RuleRunResult>,
}

/// Evaluates stored rules and persists the ones that trigger.
///
/// Rules run one after another. A provider or storage failure only affects
/// the rule being processed: its result carries the error and the run moves
/// on. Re-running within the same dedupe bucket inserts nothing new.
#[derive(Clone)]
pub struct AlertRunner {
    store: Arc<dyn RuleStore>,
    engine: RuleEngine,
}

impl AlertRunner {
    pub fn new(store: Arc<dyn RuleStore>, engine: RuleEngine) -> Self {
        Self { store, engine }
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let now = request.now.unwrap_or_else(Utc::now);
        let rule_id = non_empty(request.rule_id.as_deref());

        let rules = self
            .store
            .list_rules(&RuleFilter {
                enabled_only: rule_id.is_none(),
                rule_id: rule_id.clone(),
            })
            .await?;

        let mut report = RunReport {
            rule_id,
            dry_run: request.dry_run,
            evaluated: rules.len(),
            triggered: 0,
            inserted: 0,
            failed: 0,
            results: Vec::with_capacity(rules.len()),
        };

        for rule in &rules {
            let result = self.run_rule(rule, now, request.dry_run).await;
            if result.triggered {
                report.triggered += 1;
            }
            if result.inserted {
                report.inserted += 1;
            }
            if result.error.is_some() {
                report.failed += 1;
            }
            report.results.push(result);
        }

        tracing::info!(
            dry_run = report.dry_run,
            evaluated = report.evaluated,
            triggered = report.triggered,
            inserted = report.inserted,
            failed = report.failed,
            "Alert run finished"
        );
        Ok(report)
    }

    async fn run_rule(&self, rule: &AlertRule, now: DateTime<Utc>, dry_run: bool) -> RuleRunResult {
        let mut result = RuleRunResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type.clone(),
            triggered: false,
            severity: Severity::Info,
            reason: String::new(),
            fingerprint: None,
            inserted: false,
            instance_id: None,
            context: Map::new(),
            error: None,
        };

        let evaluation = match self.engine.evaluate(rule, now).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, "Failed to evaluate alert rule");
                result.reason = "evaluation_failed".to_string();
                result.error = Some(e.to_string());
                return result;
            }
        };

        result.triggered = evaluation.triggered;
        result.severity = evaluation.severity;
        result.reason = evaluation.reason;
        result.context = evaluation.context;

        if !result.triggered {
            return result;
        }

        let fp = fingerprint(
            &rule.id,
            &rule.scope.normalized(),
            now,
            dedupe_window_hours(&rule.params),
        );
        result.fingerprint = Some(fp.clone());

        if dry_run {
            return result;
        }

        let instance = NewAlertInstance {
            rule_id: rule.id.clone(),
            status: InstanceStatus::Open,
            severity: result.severity,
            fired_at: now,
            context_json: Value::Object(result.context.clone()),
            fingerprint: fp,
        };
        match self.store.insert_instance(&instance).await {
            Ok(outcome) => {
                if outcome.inserted {
                    tracing::info!(
                        rule_id = %rule.id,
                        severity = %result.severity,
                        reason = %result.reason,
                        "Alert instance created"
                    );
                } else {
                    tracing::debug!(rule_id = %rule.id, "Alert already fired in this bucket");
                }
                result.inserted = outcome.inserted;
                result.instance_id = outcome.id;
            }
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, "Failed to write alert instance");
                result.reason = "persist_failed".to_string();
                result.error = Some(e.to_string());
            }
        }
        result
    }
}
