//! Persistence for alert rules, fired alert instances and their AI insights.
//!
//! [`RuleStore`] is the interface the runner and the HTTP layer program
//! against. [`store::AlertStore`] implements it on top of SeaORM and works
//! with both SQLite and PostgreSQL. Deduplication of alert instances relies
//! on the unique `fingerprint` column: inserting a known fingerprint is a
//! silent no-op reported as `inserted = false`.

pub mod entities;
pub mod error;
pub mod store;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revmon_common::types::{
    AlertAiInsight, AlertInstance, AlertInstanceWithRule, AlertRule, AlertRuleType, AlertScope,
    InstanceStatus, Severity,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use error::{Result, StorageError};
pub use store::AlertStore;

pub const DEFAULT_INSTANCES_LIMIT: u64 = 100;
pub const MAX_INSTANCES_LIMIT: u64 = 500;

/// Selects which rules [`RuleStore::list_rules`] returns.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub enabled_only: bool,
    pub rule_id: Option<String>,
}

/// Full definition of a rule, used for both create and replace.
///
/// # Examples
///
/// ```
/// use revmon_storage::AlertRuleInput;
///
/// let input: AlertRuleInput = serde_json::from_value(serde_json::json!({
///     "name": "Checkout conversion",
///     "rule_type": "conversion_drop",
///     "scope": { "tenant_id": "tenant-a" },
///     "params": { "threshold_pct": 0.25 }
/// }))
/// .unwrap();
/// assert!(input.enabled);
/// assert_eq!(input.params["threshold_pct"], 0.25);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleInput {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub rule_type: AlertRuleType,
    #[serde(default)]
    pub scope: AlertScope,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// A triggered evaluation to be persisted.
#[derive(Debug, Clone)]
pub struct NewAlertInstance {
    pub rule_id: String,
    pub status: InstanceStatus,
    pub severity: Severity,
    pub fired_at: DateTime<Utc>,
    pub context_json: Value,
    pub fingerprint: String,
}

/// Result of an insert-if-absent. `id` is only set when a row was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub inserted: bool,
    pub id: Option<String>,
}

/// Filters for [`RuleStore::list_instances`]. Results are newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFilter {
    pub status: Option<InstanceStatus>,
    pub severity: Option<Severity>,
    pub tenant_id: Option<String>,
    pub rule_type: Option<AlertRuleType>,
    pub limit: Option<u64>,
}

impl InstanceFilter {
    /// Defaults to [`DEFAULT_INSTANCES_LIMIT`]; zero also falls back to the
    /// default, anything larger is capped at [`MAX_INSTANCES_LIMIT`].
    pub fn effective_limit(&self) -> u64 {
        match self.limit {
            None | Some(0) => DEFAULT_INSTANCES_LIMIT,
            Some(n) => n.min(MAX_INSTANCES_LIMIT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAlertInsight {
    pub alert_instance_id: String,
    pub model: String,
    pub prompt_hash: String,
    pub insight_md: String,
    pub actions_json: Value,
}

/// Storage seam shared by the runner, the insight generator and the HTTP API.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Lists rules, newest first. An unset filter returns every rule.
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>>;

    async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>>;

    /// Creates a rule. Unknown rule types and blank names are rejected.
    async fn create_rule(&self, input: &AlertRuleInput) -> Result<AlertRule>;

    /// Replaces a rule's definition. Returns `None` when the id is unknown.
    async fn update_rule(&self, id: &str, input: &AlertRuleInput) -> Result<Option<AlertRule>>;

    /// Inserts unless an instance with the same fingerprint already exists.
    async fn insert_instance(&self, input: &NewAlertInstance) -> Result<InsertOutcome>;

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<AlertInstance>>;

    /// Moves an instance forward through `open -> acknowledged -> resolved`.
    /// Returns `None` when the id is unknown.
    async fn update_instance_status(
        &self,
        id: &str,
        status: InstanceStatus,
    ) -> Result<Option<AlertInstance>>;

    async fn get_instance_with_rule(&self, id: &str) -> Result<Option<AlertInstanceWithRule>>;

    async fn get_insight(&self, alert_instance_id: &str) -> Result<Option<AlertAiInsight>>;

    /// Inserts or replaces the single insight of an instance.
    async fn upsert_insight(&self, input: &NewAlertInsight) -> Result<AlertAiInsight>;
}
